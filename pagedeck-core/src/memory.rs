use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{PageRef, PageSource, SourceError};

/// Page source that keeps every artifact in memory. Pages are plain labels.
pub struct MemoryPageSource {
    files: Mutex<HashMap<PathBuf, Vec<PageRef<String>>>>,
    revoked: Mutex<HashSet<Uuid>>,
    fail_next_materialize: AtomicBool,
    live: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct MemoryDocument {
    key: Uuid,
    pages: Vec<PageRef<String>>,
    live: Arc<AtomicUsize>,
}

impl MemoryDocument {
    pub fn pages(&self) -> &[PageRef<String>] {
        &self.pages
    }

    pub fn summary(&self) -> Vec<String> {
        self.pages
            .iter()
            .map(|page| match page.rotation.degrees() {
                0 => page.page.clone(),
                degrees => format!("{}@{}", page.page, degrees),
            })
            .collect()
    }
}

impl Drop for MemoryDocument {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            revoked: Mutex::new(HashSet::new()),
            fail_next_materialize: AtomicBool::new(false),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, labels: &[&str]) {
        let pages = labels
            .iter()
            .map(|label| PageRef::new(label.to_string(), Default::default()))
            .collect();
        self.files.lock().insert(path.into(), pages);
    }

    pub fn saved(&self, path: &Path) -> Option<Vec<PageRef<String>>> {
        self.files.lock().get(path).cloned()
    }

    pub fn fail_next_materialize(&self) {
        self.fail_next_materialize.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self, document: &MemoryDocument) {
        self.revoked.lock().insert(document.key);
    }

    pub fn live_artifacts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn track(&self, pages: Vec<PageRef<String>>) -> MemoryDocument {
        self.live.fetch_add(1, Ordering::SeqCst);
        MemoryDocument {
            key: Uuid::new_v4(),
            pages,
            live: Arc::clone(&self.live),
        }
    }
}

impl Default for MemoryPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MemoryPageSource {
    type Document = MemoryDocument;
    type Page = String;

    fn open(&self, path: &Path) -> Result<MemoryDocument, SourceError> {
        let pages = self.saved(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no document at {}", path.display()),
            )
        })?;
        Ok(self.track(pages))
    }

    fn page_count(&self, document: &MemoryDocument) -> usize {
        document.pages.len()
    }

    fn page_at(
        &self,
        document: &MemoryDocument,
        index: usize,
    ) -> Result<PageRef<String>, SourceError> {
        document
            .pages
            .get(index)
            .cloned()
            .ok_or(SourceError::OutOfRange {
                index,
                page_count: document.pages.len(),
            })
    }

    fn materialize(&self, pages: &[PageRef<String>]) -> Result<MemoryDocument, SourceError> {
        if self.fail_next_materialize.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected materialize failure").into());
        }
        Ok(self.track(pages.to_vec()))
    }

    fn check_available(&self, document: &MemoryDocument) -> Result<(), SourceError> {
        if self.revoked.lock().contains(&document.key) {
            return Err(SourceError::Unavailable(document.key.to_string()));
        }
        Ok(())
    }

    fn save(&self, document: &MemoryDocument, dest: &Path) -> Result<(), SourceError> {
        self.files
            .lock()
            .insert(dest.to_path_buf(), document.pages.clone());
        Ok(())
    }
}
