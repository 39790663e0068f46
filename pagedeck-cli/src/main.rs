mod config;
mod script;

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use pagedeck_core::{DocumentSession, PageSource};
use pagedeck_pdf::PdfPageSource;
use serde::Serialize;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

use crate::config::Settings;
use crate::script::{parse_line, Action, HELP};

#[derive(Debug, Parser)]
#[command(
    name = "pagedeck",
    version,
    about = "Rotate, duplicate, remove and reorder PDF pages with undo"
)]
struct Args {
    /// PDF to open on start
    file: Option<PathBuf>,

    /// Read commands from this file instead of stdin; the first failing line aborts
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Settings file (defaults to config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for intermediate PDFs
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Compress streams in written PDFs
    #[arg(long)]
    compress: bool,

    /// Print status as one JSON object per line
    #[arg(long)]
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "pagedeck", "pagedeck")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let settings = Settings::load(
        args.config.as_deref(),
        &Settings::default_path(&project_dirs),
    )?;
    let _log_guard = init_logging(&project_dirs, &settings.log_filter)?;

    let scratch_dir = args
        .scratch_dir
        .clone()
        .unwrap_or_else(|| settings.scratch_dir());
    let source =
        PdfPageSource::new(scratch_dir)?.with_compression(settings.compress || args.compress);
    let mut session = DocumentSession::new(source);

    if let Some(path) = &args.file {
        session.open(path)?;
    }

    let strict = args.script.is_some();
    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open script {:?}", path))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut stdout = io::stdout().lock();

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        match run_line(&mut session, &line, &mut stdout, args.json) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) if strict => return Err(err.context(format!("line {}", number + 1))),
            Err(err) => eprintln!("error: {err:#}"),
        }
    }

    if session.has_unsaved_changes() {
        warn!(path = ?session.location(), "discarding unsaved changes");
    }
    session.close(true)?;
    Ok(())
}

fn run_line<S: PageSource>(
    session: &mut DocumentSession<S>,
    line: &str,
    out: &mut impl Write,
    json: bool,
) -> Result<Flow> {
    match parse_line(line)? {
        Some(action) => run_action(session, action, out, json),
        None => Ok(Flow::Continue),
    }
}

fn run_action<S: PageSource>(
    session: &mut DocumentSession<S>,
    action: Action,
    out: &mut impl Write,
    json: bool,
) -> Result<Flow> {
    match action {
        Action::Select(index) => session.select_single(index)?,
        Action::Extend(index) => session.select_range(index)?,
        Action::Toggle(index) => session.toggle_selection(index)?,
        Action::SelectAll => session.select_all(),
        Action::ClearSelection => session.clear_selection(),
        Action::Edit(mutation) => session.apply(mutation)?,
        Action::Swap(first, second) => session.swap_pages(first, second)?,
        Action::Move { from, to } => session.move_page(from, to)?,
        Action::Undo => {
            if !session.undo()? {
                writeln!(out, "nothing to undo")?;
                return Ok(Flow::Continue);
            }
        }
        Action::Redo => {
            if !session.redo()? {
                writeln!(out, "nothing to redo")?;
                return Ok(Flow::Continue);
            }
        }
        Action::Open(path) => {
            session.close(false)?;
            session.open(path)?;
        }
        Action::Close { force } => session.close(force)?,
        Action::Save => session.save()?,
        Action::SaveAs(path) => session.save_as(path)?,
        Action::Status => {}
        Action::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(Flow::Continue);
        }
        Action::Quit => return Ok(Flow::Quit),
    }

    for event in session.drain_events() {
        debug!(?event, "session event");
    }

    let report = StatusReport::capture(session)?;
    if json {
        serde_json::to_writer(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", report.format_line())?;
    }
    Ok(Flow::Continue)
}

#[derive(Debug, Serialize)]
struct StatusReport {
    path: Option<PathBuf>,
    page_count: usize,
    rotations: Vec<u16>,
    selected: Vec<usize>,
    unsaved: bool,
    next_undo: Option<String>,
    next_redo: Option<String>,
}

impl StatusReport {
    fn capture<S: PageSource>(session: &DocumentSession<S>) -> Result<Self> {
        let rotations = session
            .pages()?
            .iter()
            .map(|page| page.rotation.degrees())
            .collect();
        Ok(Self {
            path: session.location().map(PathBuf::from),
            page_count: session.page_count(),
            rotations,
            selected: session.selection().iter().map(|index| index + 1).collect(),
            unsaved: session.has_unsaved_changes(),
            next_undo: session
                .history()
                .peek_undo()
                .map(|command| command.edit().to_string()),
            next_redo: session
                .history()
                .peek_redo()
                .map(|command| command.edit().to_string()),
        })
    }

    fn format_line(&self) -> String {
        let Some(path) = &self.path else {
            return "no document".to_string();
        };

        let mut status = format!(
            "{}{} | {} pages",
            path.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("<unknown>"),
            if self.unsaved { " [+]" } else { "" },
            self.page_count,
        );
        let rotated: Vec<String> = self
            .rotations
            .iter()
            .enumerate()
            .filter(|(_, degrees)| **degrees != 0)
            .map(|(index, degrees)| format!("{}@{}", index + 1, degrees))
            .collect();
        if !rotated.is_empty() {
            status.push_str(&format!(" | rotated {}", rotated.join(",")));
        }
        if !self.selected.is_empty() {
            let selected: Vec<String> = self.selected.iter().map(usize::to_string).collect();
            status.push_str(&format!(" | selected {}", selected.join(",")));
        }
        if let Some(edit) = &self.next_undo {
            status.push_str(&format!(" | undo: {edit}"));
        }
        if let Some(edit) = &self.next_redo {
            status.push_str(&format!(" | redo: {edit}"));
        }
        status
    }
}

fn init_logging(project_dirs: &ProjectDirs, default_filter: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pagedeck.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter {:?}", default_filter))?,
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries status lines
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
