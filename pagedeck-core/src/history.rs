use tracing::{debug, info, warn};

use crate::{ActiveDocument, Command, CommandError, CommandId, PageSource};

#[derive(Debug)]
pub struct History<D> {
    undo_stack: Vec<Command<D>>,
    redo_stack: Vec<Command<D>>,
}

impl<D> History<D> {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn execute<S>(
        &mut self,
        mut command: Command<D>,
        source: &S,
        document: &mut ActiveDocument<D>,
    ) -> Result<(), CommandError>
    where
        S: PageSource<Document = D>,
    {
        if let Err(err) = command.execute(source, document) {
            warn!(command = %command.id(), edit = %command.edit(), %err, "command failed");
            return Err(err);
        }

        let discarded = self.redo_stack.len();
        self.redo_stack.clear();
        info!(command = %command.id(), edit = %command.edit(), discarded, "executed");
        self.undo_stack.push(command);
        Ok(())
    }

    /// Returns `Ok(false)` when there is nothing to undo. A failed undo leaves
    /// the command on top of the undo stack so it can be retried.
    pub fn undo<S>(
        &mut self,
        source: &S,
        document: &mut ActiveDocument<D>,
    ) -> Result<bool, CommandError>
    where
        S: PageSource<Document = D>,
    {
        let Some(mut command) = self.undo_stack.pop() else {
            debug!("nothing to undo");
            return Ok(false);
        };

        match command.undo(source, document) {
            Ok(()) => {
                info!(command = %command.id(), edit = %command.edit(), "undone");
                self.redo_stack.push(command);
                Ok(true)
            }
            Err(err) => {
                warn!(command = %command.id(), edit = %command.edit(), %err, "undo failed");
                self.undo_stack.push(command);
                Err(err)
            }
        }
    }

    pub fn redo<S>(
        &mut self,
        source: &S,
        document: &mut ActiveDocument<D>,
    ) -> Result<bool, CommandError>
    where
        S: PageSource<Document = D>,
    {
        let Some(mut command) = self.redo_stack.pop() else {
            debug!("nothing to redo");
            return Ok(false);
        };

        match command.execute(source, document) {
            Ok(()) => {
                info!(command = %command.id(), edit = %command.edit(), "redone");
                self.undo_stack.push(command);
                Ok(true)
            }
            Err(err) => {
                warn!(command = %command.id(), edit = %command.edit(), %err, "redo failed");
                self.redo_stack.push(command);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn peek_undo(&self) -> Option<&Command<D>> {
        self.undo_stack.last()
    }

    pub fn peek_redo(&self) -> Option<&Command<D>> {
        self.redo_stack.last()
    }

    pub fn undo_ids(&self) -> Vec<CommandId> {
        self.undo_stack.iter().map(Command::id).collect()
    }

    pub fn redo_ids(&self) -> Vec<CommandId> {
        self.redo_stack.iter().map(Command::id).collect()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl<D> Default for History<D> {
    fn default() -> Self {
        Self::new()
    }
}
