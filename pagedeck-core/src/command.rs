use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{ActiveDocument, CommandError, DocumentHandle, PageRef, PageSource, Rotation, Snapshot};

pub type CommandId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEdit {
    Rotate {
        indices: Vec<usize>,
        rotation: Rotation,
    },
    Duplicate {
        indices: Vec<usize>,
    },
    Remove {
        indices: Vec<usize>,
    },
    Reorder {
        order: Vec<usize>,
    },
}

impl PageEdit {
    pub fn rotate(
        indices: impl IntoIterator<Item = usize>,
        rotation: Rotation,
    ) -> Result<Self, CommandError> {
        if rotation == Rotation::None {
            return Err(CommandError::InvalidRotation(0));
        }
        Ok(PageEdit::Rotate {
            indices: collect_indices(indices)?,
            rotation,
        })
    }

    pub fn duplicate(indices: impl IntoIterator<Item = usize>) -> Result<Self, CommandError> {
        Ok(PageEdit::Duplicate {
            indices: collect_indices(indices)?,
        })
    }

    pub fn remove(indices: impl IntoIterator<Item = usize>) -> Result<Self, CommandError> {
        Ok(PageEdit::Remove {
            indices: collect_indices(indices)?,
        })
    }

    pub fn reorder(order: Vec<usize>, page_count: usize) -> Result<Self, CommandError> {
        validate_permutation(&order, page_count)?;
        Ok(PageEdit::Reorder { order })
    }

    pub fn preserves_indices(&self) -> bool {
        matches!(self, PageEdit::Rotate { .. })
    }

    pub fn plan<P: Clone>(&self, pages: Vec<PageRef<P>>) -> Result<Vec<PageRef<P>>, CommandError> {
        self.validate(pages.len())?;

        let sequence = match self {
            PageEdit::Rotate { indices, rotation } => pages
                .into_iter()
                .enumerate()
                .map(|(index, page)| {
                    if indices.binary_search(&index).is_ok() {
                        page.rotated(*rotation)
                    } else {
                        page
                    }
                })
                .collect(),
            PageEdit::Duplicate { indices } => {
                let mut sequence = Vec::with_capacity(pages.len() + indices.len());
                for (index, page) in pages.into_iter().enumerate() {
                    if indices.binary_search(&index).is_ok() {
                        sequence.push(page.clone());
                    }
                    sequence.push(page);
                }
                sequence
            }
            PageEdit::Remove { indices } => pages
                .into_iter()
                .enumerate()
                .filter(|(index, _)| indices.binary_search(index).is_err())
                .map(|(_, page)| page)
                .collect(),
            PageEdit::Reorder { order } => {
                order.iter().map(|&index| pages[index].clone()).collect()
            }
        };

        Ok(sequence)
    }

    fn validate(&self, page_count: usize) -> Result<(), CommandError> {
        match self {
            PageEdit::Rotate { indices, .. }
            | PageEdit::Duplicate { indices }
            | PageEdit::Remove { indices } => {
                if let Some(&index) = indices.iter().find(|&&index| index >= page_count) {
                    return Err(CommandError::OutOfRange { index, page_count });
                }
                if matches!(self, PageEdit::Remove { .. }) && indices.len() >= page_count {
                    return Err(CommandError::EmptyResult);
                }
                Ok(())
            }
            PageEdit::Reorder { order } => validate_permutation(order, page_count),
        }
    }
}

impl fmt::Display for PageEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageEdit::Rotate { indices, rotation } => write!(
                f,
                "rotate {} page(s) by {}°",
                indices.len(),
                rotation.degrees()
            ),
            PageEdit::Duplicate { indices } => write!(f, "duplicate {} page(s)", indices.len()),
            PageEdit::Remove { indices } => write!(f, "remove {} page(s)", indices.len()),
            PageEdit::Reorder { order } => write!(f, "reorder {} page(s)", order.len()),
        }
    }
}

fn collect_indices(indices: impl IntoIterator<Item = usize>) -> Result<Vec<usize>, CommandError> {
    let unique: BTreeSet<usize> = indices.into_iter().collect();
    if unique.is_empty() {
        return Err(CommandError::NoSelection);
    }
    Ok(unique.into_iter().collect())
}

fn validate_permutation(order: &[usize], page_count: usize) -> Result<(), CommandError> {
    let invalid = CommandError::InvalidPermutation { page_count };
    if order.len() != page_count {
        return Err(invalid);
    }
    let mut seen = vec![false; page_count];
    for &index in order {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(invalid),
        }
    }
    Ok(())
}

/// One executed (or executable) edit. Once executed it holds the handle that
/// was active before it ran; undo puts that handle back and lets go of it.
#[derive(Debug)]
pub struct Command<D> {
    id: CommandId,
    edit: PageEdit,
    prior: Option<DocumentHandle<D>>,
}

impl<D> Command<D> {
    pub fn new(edit: PageEdit) -> Self {
        Self {
            id: Uuid::new_v4(),
            edit,
            prior: None,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn edit(&self) -> &PageEdit {
        &self.edit
    }

    pub fn is_executed(&self) -> bool {
        self.prior.is_some()
    }

    pub fn execute<S>(
        &mut self,
        source: &S,
        document: &mut ActiveDocument<D>,
    ) -> Result<(), CommandError>
    where
        S: PageSource<Document = D>,
    {
        let current = Arc::clone(document.handle());
        let page_count = source.page_count(current.document());
        let pages = (0..page_count)
            .map(|index| source.page_at(current.document(), index))
            .collect::<Result<Vec<_>, _>>()?;

        let sequence = self.edit.plan(pages)?;
        let artifact = source.materialize(&sequence).map_err(CommandError::Io)?;
        let handle = Arc::new(Snapshot::new(artifact));
        debug!(
            command = %self.id,
            artifact = %handle.id(),
            pages = sequence.len(),
            "materialized edit"
        );

        self.prior = Some(document.replace_handle(handle));
        Ok(())
    }

    pub fn undo<S>(
        &mut self,
        source: &S,
        document: &mut ActiveDocument<D>,
    ) -> Result<(), CommandError>
    where
        S: PageSource<Document = D>,
    {
        let prior = self.prior.take().ok_or(CommandError::NotExecuted)?;
        if let Err(err) = source.check_available(prior.document()) {
            self.prior = Some(prior);
            return Err(CommandError::UndoFailed(err));
        }

        let discarded = document.replace_handle(prior);
        debug!(
            command = %self.id,
            discarded = %discarded.id(),
            restored = %document.handle().id(),
            "restored prior document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::{MemoryDocument, MemoryPageSource};

    fn open(source: &MemoryPageSource, labels: &[&str]) -> ActiveDocument<MemoryDocument> {
        source.insert("/docs/input.pdf", labels);
        let document = source.open(Path::new("/docs/input.pdf")).unwrap();
        ActiveDocument::new(
            Arc::new(Snapshot::new(document)),
            PathBuf::from("/docs/input.pdf"),
        )
    }

    fn summary(document: &ActiveDocument<MemoryDocument>) -> Vec<String> {
        document.handle().document().summary()
    }

    #[test]
    fn rotate_passes_unselected_pages_through() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        let mut command = Command::new(PageEdit::rotate([1], Rotation::Clockwise90).unwrap());

        command.execute(&source, &mut document).unwrap();

        assert_eq!(summary(&document), vec!["A", "B@90", "C"]);
        assert!(document.has_unsaved_changes());
    }

    #[test]
    fn rotation_is_cumulative() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B"]);

        for _ in 0..3 {
            Command::new(PageEdit::rotate([0], Rotation::Clockwise180).unwrap())
                .execute(&source, &mut document)
                .unwrap();
        }

        assert_eq!(summary(&document), vec!["A@180", "B"]);
    }

    #[test]
    fn duplicate_emits_copy_right_after_original() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        let mut command = Command::new(PageEdit::duplicate([2, 0]).unwrap());

        command.execute(&source, &mut document).unwrap();

        assert_eq!(summary(&document), vec!["A", "A", "B", "C", "C"]);
    }

    #[test]
    fn remove_keeps_survivor_order() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C", "D"]);
        let mut command = Command::new(PageEdit::remove([0, 2]).unwrap());

        command.execute(&source, &mut document).unwrap();

        assert_eq!(summary(&document), vec!["B", "D"]);
    }

    #[test]
    fn reorder_emits_given_permutation() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        let mut command = Command::new(PageEdit::reorder(vec![2, 0, 1], 3).unwrap());

        command.execute(&source, &mut document).unwrap();

        assert_eq!(summary(&document), vec!["C", "A", "B"]);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        for order in [vec![0, 1], vec![0, 0, 1], vec![0, 1, 3], vec![2, 1, 0, 3]] {
            assert!(matches!(
                PageEdit::reorder(order, 3),
                Err(CommandError::InvalidPermutation { page_count: 3 })
            ));
        }
    }

    #[test]
    fn empty_index_set_is_no_selection() {
        assert!(matches!(
            PageEdit::remove(Vec::new()),
            Err(CommandError::NoSelection)
        ));
        assert!(matches!(
            PageEdit::rotate(Vec::new(), Rotation::Clockwise90),
            Err(CommandError::NoSelection)
        ));
        assert!(matches!(
            PageEdit::rotate([0], Rotation::None),
            Err(CommandError::InvalidRotation(0))
        ));
    }

    #[test]
    fn removing_every_page_fails_before_materializing() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B"]);
        let before = Arc::clone(document.handle());
        let live = source.live_artifacts();
        let mut command = Command::new(PageEdit::remove([0, 1]).unwrap());

        let err = command.execute(&source, &mut document).unwrap_err();

        assert!(matches!(err, CommandError::EmptyResult));
        assert!(Arc::ptr_eq(&before, document.handle()));
        assert_eq!(source.live_artifacts(), live);
        assert!(!command.is_executed());
    }

    #[test]
    fn stale_index_is_rejected() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        // Built against the three-page layout, then the document shrinks.
        let mut stale = Command::new(PageEdit::rotate([2], Rotation::Clockwise90).unwrap());
        Command::new(PageEdit::remove([0]).unwrap())
            .execute(&source, &mut document)
            .unwrap();

        let err = stale.execute(&source, &mut document).unwrap_err();

        assert!(matches!(
            err,
            CommandError::OutOfRange {
                index: 2,
                page_count: 2
            }
        ));
        assert_eq!(summary(&document), vec!["B", "C"]);
    }

    #[test]
    fn materialize_failure_leaves_handle_unchanged() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B"]);
        let before = Arc::clone(document.handle());
        source.fail_next_materialize();

        let err = Command::new(PageEdit::duplicate([0]).unwrap())
            .execute(&source, &mut document)
            .unwrap_err();

        assert!(matches!(err, CommandError::Io(_)));
        assert!(Arc::ptr_eq(&before, document.handle()));
        assert!(!document.has_unsaved_changes());
    }

    #[test]
    fn undo_restores_exact_prior_handle() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        let original = Arc::clone(document.handle());
        let mut command = Command::new(PageEdit::remove([1]).unwrap());

        command.execute(&source, &mut document).unwrap();
        command.undo(&source, &mut document).unwrap();

        assert!(Arc::ptr_eq(&original, document.handle()));
        assert_eq!(summary(&document), vec!["A", "B", "C"]);
        assert!(!document.has_unsaved_changes());
        assert!(!command.is_executed());
        drop(original);
        assert_eq!(source.live_artifacts(), 1);
    }

    #[test]
    fn redo_materializes_a_fresh_equal_artifact() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B", "C"]);
        let mut command = Command::new(PageEdit::reorder(vec![1, 2, 0], 3).unwrap());

        command.execute(&source, &mut document).unwrap();
        let first = document.handle().id();
        let first_summary = summary(&document);
        command.undo(&source, &mut document).unwrap();
        command.execute(&source, &mut document).unwrap();

        assert_ne!(document.handle().id(), first);
        assert_eq!(summary(&document), first_summary);
    }

    #[test]
    fn undo_keeps_prior_when_it_is_unreachable() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A", "B"]);
        let mut command = Command::new(PageEdit::duplicate([1]).unwrap());
        command.execute(&source, &mut document).unwrap();
        source.revoke(command.prior.as_ref().unwrap().document());
        let edited = Arc::clone(document.handle());

        let err = command.undo(&source, &mut document).unwrap_err();

        assert!(matches!(err, CommandError::UndoFailed(_)));
        assert!(command.is_executed());
        assert!(Arc::ptr_eq(&edited, document.handle()));
    }

    #[test]
    fn undo_before_execute_is_an_error() {
        let source = MemoryPageSource::new();
        let mut document = open(&source, &["A"]);
        let mut command = Command::new(PageEdit::duplicate([0]).unwrap());

        assert!(matches!(
            command.undo(&source, &mut document),
            Err(CommandError::NotExecuted)
        ));
    }

    #[test]
    fn describes_itself_for_menus() {
        let edit = PageEdit::rotate([0, 3], Rotation::Clockwise270).unwrap();
        assert_eq!(edit.to_string(), "rotate 2 page(s) by 270°");
        assert_eq!(
            PageEdit::remove([1]).unwrap().to_string(),
            "remove 1 page(s)"
        );
    }
}
