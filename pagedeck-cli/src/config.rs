use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scratch_dir: Option<PathBuf>,
    pub log_filter: String,
    pub compress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            log_filter: "info".to_string(),
            compress: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid settings")
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("in {:?}", path))
    }

    pub fn load(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_toml_file(path),
            None if fallback.exists() => Self::from_toml_file(fallback),
            None => Ok(Self::default()),
        }
    }

    pub fn default_path(project_dirs: &ProjectDirs) -> PathBuf {
        project_dirs.config_dir().join(CONFIG_FILE)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pagedeck"))
    }
}
