/// Undo/Redo history of whole-session snapshots
use crate::page::Page;

/// Deep copy of every page after a committed mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub pages: Vec<Page>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored,
    NothingToUndo,
    NothingToRedo,
}

/// The last entry of `undo_stack` is always the current state; undo pops it
/// onto the redo stack and restores the one below. The bottom entry is the
/// base state and is never popped.
#[derive(Clone, Debug)]
pub struct History {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    max_entries: usize,
}

impl History {
    pub fn new(initial: Snapshot, max_entries: usize) -> Self {
        Self {
            undo_stack: vec![initial],
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record the state after a committed mutation.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.undo_stack.push(snapshot);
        self.redo_stack.clear();

        // Limit history size; the oldest retained entry becomes the base
        if self.undo_stack.len() > self.max_entries {
            let excess = self.undo_stack.len() - self.max_entries;
            self.undo_stack.drain(..excess);
        }
    }

    /// Step back one entry and return the state to restore.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.undo_stack.len() <= 1 {
            return None;
        }
        if let Some(current) = self.undo_stack.pop() {
            self.redo_stack.push(current);
        }
        self.undo_stack.last()
    }

    /// Re-apply the most recently undone entry and return it.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push(entry);
        self.undo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of entries, including the base state.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }
}
