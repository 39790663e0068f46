use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

mod command;
mod history;
mod memory;
mod selection;
mod session;

pub use command::{Command, CommandId, PageEdit};
pub use history::History;
pub use memory::{MemoryDocument, MemoryPageSource};
pub use selection::PageSelection;
pub use session::{DocumentSession, Mutation, SessionEvent, UnsavedChanges};

pub type ArtifactId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    pub fn rotated_by(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(i64::from(self.degrees()) + i64::from(other.degrees()))
            .unwrap_or_default()
    }
}

impl TryFrom<i64> for Rotation {
    type Error = CommandError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        match degrees {
            90 => Ok(Rotation::Clockwise90),
            180 => Ok(Rotation::Clockwise180),
            270 => Ok(Rotation::Clockwise270),
            other => Err(CommandError::InvalidRotation(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef<P> {
    pub page: P,
    pub rotation: Rotation,
}

impl<P> PageRef<P> {
    pub fn new(page: P, rotation: Rotation) -> Self {
        Self { page, rotation }
    }

    pub fn rotated(mut self, by: Rotation) -> Self {
        self.rotation = self.rotation.rotated_by(by);
        self
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("page {index} out of range for a document of {page_count} page(s)")]
    OutOfRange { index: usize, page_count: usize },
    #[error("artifact {0} is no longer available")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("document backend failure")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SourceError::Backend(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no pages selected")]
    NoSelection,
    #[error("removing every page would leave an empty document")]
    EmptyResult,
    #[error("page {index} out of range for a document of {page_count} page(s)")]
    OutOfRange { index: usize, page_count: usize },
    #[error("page order is not a permutation of {page_count} page(s)")]
    InvalidPermutation { page_count: usize },
    #[error("rotation must be 90, 180 or 270 degrees, got {0}")]
    InvalidRotation(i64),
    #[error("no document is open")]
    NoDocument,
    #[error("command has not been executed")]
    NotExecuted,
    #[error("failed to materialize the edited document")]
    Io(#[source] SourceError),
    #[error("failed to restore the previous document")]
    UndoFailed(#[source] SourceError),
}

impl From<SourceError> for CommandError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::OutOfRange { index, page_count } => {
                CommandError::OutOfRange { index, page_count }
            }
            other => CommandError::Io(other),
        }
    }
}

/// Reads and writes whole documents. Artifacts are immutable once produced;
/// dropping one releases whatever backing storage it owns.
pub trait PageSource {
    type Document;
    type Page: Clone;

    fn open(&self, path: &Path) -> Result<Self::Document, SourceError>;

    fn page_count(&self, document: &Self::Document) -> usize;

    fn page_at(
        &self,
        document: &Self::Document,
        index: usize,
    ) -> Result<PageRef<Self::Page>, SourceError>;

    fn materialize(&self, pages: &[PageRef<Self::Page>]) -> Result<Self::Document, SourceError>;

    fn check_available(&self, document: &Self::Document) -> Result<(), SourceError>;

    fn save(&self, document: &Self::Document, dest: &Path) -> Result<(), SourceError>;
}

#[derive(Debug)]
pub struct Snapshot<D> {
    id: ArtifactId,
    document: D,
}

impl<D> Snapshot<D> {
    pub fn new(document: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn document(&self) -> &D {
        &self.document
    }
}

pub type DocumentHandle<D> = Arc<Snapshot<D>>;

#[derive(Debug)]
pub struct ActiveDocument<D> {
    handle: DocumentHandle<D>,
    location: PathBuf,
    saved: Option<ArtifactId>,
}

impl<D> ActiveDocument<D> {
    pub fn new(handle: DocumentHandle<D>, location: PathBuf) -> Self {
        let saved = Some(handle.id());
        Self {
            handle,
            location,
            saved,
        }
    }

    pub fn handle(&self) -> &DocumentHandle<D> {
        &self.handle
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.saved != Some(self.handle.id())
    }

    pub(crate) fn replace_handle(&mut self, handle: DocumentHandle<D>) -> DocumentHandle<D> {
        std::mem::replace(&mut self.handle, handle)
    }

    pub(crate) fn mark_saved(&mut self, location: PathBuf) {
        self.location = location;
        self.saved = Some(self.handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_accumulates_and_wraps() {
        let quarter = Rotation::Clockwise90;
        assert_eq!(quarter.rotated_by(quarter), Rotation::Clockwise180);
        assert_eq!(
            Rotation::Clockwise270.rotated_by(Rotation::Clockwise180),
            Rotation::Clockwise90
        );
        assert_eq!(
            Rotation::Clockwise270.rotated_by(quarter),
            Rotation::None
        );
    }

    #[test]
    fn rotation_normalizes_stored_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Clockwise270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Clockwise90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn requested_rotation_rejects_other_values() {
        assert_eq!(Rotation::try_from(180_i64).unwrap(), Rotation::Clockwise180);
        for degrees in [0_i64, -90, 45, 360] {
            assert!(matches!(
                Rotation::try_from(degrees),
                Err(CommandError::InvalidRotation(d)) if d == degrees
            ));
        }
    }

    #[test]
    fn unsaved_flag_follows_saved_artifact() {
        let first = Arc::new(Snapshot::new("a"));
        let mut doc = ActiveDocument::new(Arc::clone(&first), PathBuf::from("/tmp/a.pdf"));
        assert!(!doc.has_unsaved_changes());

        let previous = doc.replace_handle(Arc::new(Snapshot::new("b")));
        assert!(doc.has_unsaved_changes());

        doc.replace_handle(previous);
        assert!(!doc.has_unsaved_changes());

        doc.replace_handle(Arc::new(Snapshot::new("c")));
        doc.mark_saved(PathBuf::from("/tmp/c.pdf"));
        assert!(!doc.has_unsaved_changes());
        assert_eq!(doc.location(), Path::new("/tmp/c.pdf"));
    }
}
