use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    ActiveDocument, Command, CommandError, History, PageEdit, PageRef, PageSelection, PageSource,
    Rotation, Snapshot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Rotate(Rotation),
    Duplicate,
    Remove,
    Reorder(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentOpened(PathBuf),
    DocumentClosed(PathBuf),
    PagesChanged { page_count: usize },
    SelectionChanged,
    Saved(PathBuf),
}

#[derive(Debug, Error)]
#[error("{} has unsaved changes", path.display())]
pub struct UnsavedChanges {
    pub path: PathBuf,
}

pub struct DocumentSession<S: PageSource> {
    source: S,
    document: Option<ActiveDocument<S::Document>>,
    history: History<S::Document>,
    selection: PageSelection,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl<S: PageSource> DocumentSession<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            document: None,
            history: History::new(),
            selection: PageSelection::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn active(&self) -> Option<&ActiveDocument<S::Document>> {
        self.document.as_ref()
    }

    pub fn history(&self) -> &History<S::Document> {
        &self.history
    }

    pub fn selection(&self) -> &PageSelection {
        &self.selection
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = self
            .source
            .open(path)
            .with_context(|| format!("failed to open {:?}", path))?;
        let page_count = self.source.page_count(&document);

        self.history.clear();
        self.selection.clear();
        self.document = Some(ActiveDocument::new(
            Arc::new(Snapshot::new(document)),
            path.to_path_buf(),
        ));
        info!(page_count, "document opened");

        let mut events = self.events.lock();
        events.push(SessionEvent::DocumentOpened(path.to_path_buf()));
        events.push(SessionEvent::PagesChanged { page_count });
        events.push(SessionEvent::SelectionChanged);
        Ok(())
    }

    /// Refuses with [`UnsavedChanges`] unless `force` is set.
    #[instrument(skip(self))]
    pub fn close(&mut self, force: bool) -> Result<()> {
        let Some(document) = self.document.as_ref() else {
            return Ok(());
        };
        if document.has_unsaved_changes() && !force {
            return Err(UnsavedChanges {
                path: document.location().to_path_buf(),
            }
            .into());
        }

        let location = document.location().to_path_buf();
        self.history.clear();
        self.selection.clear();
        self.document = None;
        info!(path = %location.display(), "document closed");
        self.events.lock().push(SessionEvent::DocumentClosed(location));
        Ok(())
    }

    pub fn save(&mut self) -> Result<()> {
        let location = self
            .document
            .as_ref()
            .ok_or(CommandError::NoDocument)?
            .location()
            .to_path_buf();
        self.save_as(location)
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = self.document.as_mut().ok_or(CommandError::NoDocument)?;
        self.source
            .save(document.handle().document(), path)
            .with_context(|| format!("failed to save {:?}", path))?;
        document.mark_saved(path.to_path_buf());
        info!("document saved");
        self.events
            .lock()
            .push(SessionEvent::Saved(path.to_path_buf()));
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn location(&self) -> Option<&Path> {
        self.document.as_ref().map(ActiveDocument::location)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(ActiveDocument::has_unsaved_changes)
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map(|document| self.source.page_count(document.handle().document()))
            .unwrap_or(0)
    }

    pub fn page_ref(&self, index: usize) -> Result<PageRef<S::Page>, CommandError> {
        let document = self.document.as_ref().ok_or(CommandError::NoDocument)?;
        Ok(self.source.page_at(document.handle().document(), index)?)
    }

    pub fn pages(&self) -> Result<Vec<PageRef<S::Page>>, CommandError> {
        (0..self.page_count())
            .map(|index| self.page_ref(index))
            .collect()
    }

    pub fn select_single(&mut self, index: usize) -> Result<(), CommandError> {
        self.check_index(index)?;
        self.selection.select_single(index);
        self.selection_changed();
        Ok(())
    }

    pub fn select_range(&mut self, index: usize) -> Result<(), CommandError> {
        self.check_index(index)?;
        self.selection.select_range(index);
        self.selection_changed();
        Ok(())
    }

    pub fn toggle_selection(&mut self, index: usize) -> Result<(), CommandError> {
        self.check_index(index)?;
        self.selection.toggle(index);
        self.selection_changed();
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(self.page_count());
        self.selection_changed();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.selection_changed();
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), CommandError> {
        if self.document.is_none() {
            return Err(CommandError::NoDocument);
        }
        let edit = match mutation {
            Mutation::Rotate(rotation) => PageEdit::rotate(self.selection.iter(), rotation)?,
            Mutation::Duplicate => PageEdit::duplicate(self.selection.iter())?,
            Mutation::Remove => PageEdit::remove(self.selection.iter())?,
            Mutation::Reorder(order) => PageEdit::reorder(order, self.page_count())?,
        };
        self.execute(edit)
    }

    pub fn swap_pages(&mut self, first: usize, second: usize) -> Result<(), CommandError> {
        self.check_index(first)?;
        self.check_index(second)?;
        if first == second {
            return Ok(());
        }
        let mut order: Vec<usize> = (0..self.page_count()).collect();
        order.swap(first, second);
        self.apply(Mutation::Reorder(order))
    }

    pub fn move_page(&mut self, from: usize, to: usize) -> Result<(), CommandError> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let mut order: Vec<usize> = (0..self.page_count()).collect();
        let page = order.remove(from);
        order.insert(to, page);
        self.apply(Mutation::Reorder(order))
    }

    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        let Some(document) = self.document.as_mut() else {
            return Ok(false);
        };
        let undone = self.history.undo(&self.source, document)?;
        if undone {
            self.pages_changed(false);
        }
        Ok(undone)
    }

    #[instrument(skip(self))]
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        let Some(document) = self.document.as_mut() else {
            return Ok(false);
        };
        let redone = self.history.redo(&self.source, document)?;
        if redone {
            self.pages_changed(false);
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn execute(&mut self, edit: PageEdit) -> Result<(), CommandError> {
        let document = self.document.as_mut().ok_or(CommandError::NoDocument)?;
        let keep_selection = edit.preserves_indices();
        self.history
            .execute(Command::new(edit), &self.source, document)?;
        self.pages_changed(keep_selection);
        Ok(())
    }

    /// Index-to-page correspondence is gone after anything but a rotation,
    /// so the selection is cleared; a rotation only re-validates it.
    fn pages_changed(&mut self, keep_selection: bool) {
        let page_count = self.page_count();
        if keep_selection {
            self.selection.clamp(page_count);
        } else {
            self.selection.clear();
        }
        let mut events = self.events.lock();
        events.push(SessionEvent::PagesChanged { page_count });
        events.push(SessionEvent::SelectionChanged);
    }

    fn selection_changed(&self) {
        self.events.lock().push(SessionEvent::SelectionChanged);
    }

    fn check_index(&self, index: usize) -> Result<(), CommandError> {
        if self.document.is_none() {
            return Err(CommandError::NoDocument);
        }
        let page_count = self.page_count();
        if index >= page_count {
            return Err(CommandError::OutOfRange { index, page_count });
        }
        Ok(())
    }
}
