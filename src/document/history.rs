//! Grouped undo/redo over [`DocumentEdit`]s.

use tracing::warn;

use crate::document::edit::DocumentEdit;
use crate::document::styled::Document;
use crate::error::Result;

/// Default maximum number of undo groups to retain.
pub const DEFAULT_MAX_HISTORY_DEPTH: usize = 1000;

/// Undo history for a [`Document`] with bounded memory usage.
///
/// Edits added with [`add_edit`](Self::add_edit) collect into the current
/// group until [`commit`](Self::commit); undo and redo act on whole groups.
/// Adding an edit discards anything that could be redone.
#[derive(Debug)]
pub struct UndoManager {
    undo_stack: Vec<Vec<DocumentEdit>>,
    redo_stack: Vec<Vec<DocumentEdit>>,
    current_group: Vec<DocumentEdit>,
    /// Oldest groups are dropped past this depth.
    max_depth: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            current_group: Vec::new(),
            max_depth: DEFAULT_MAX_HISTORY_DEPTH,
        }
    }
}

impl UndoManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history with a custom maximum depth.
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Takes effect on the next commit.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Record an edit that has just been applied.
    pub fn add_edit(&mut self, edit: DocumentEdit) {
        self.current_group.push(edit);
        self.redo_stack.clear();
    }

    /// Close the current group.
    pub fn commit(&mut self) {
        if !self.current_group.is_empty() {
            self.undo_stack
                .push(std::mem::take(&mut self.current_group));
            if self.undo_stack.len() > self.max_depth {
                let excess = self.undo_stack.len() - self.max_depth;
                self.undo_stack.drain(..excess);
            }
        }
    }

    /// Undo the last group. Returns false if there was nothing to undo.
    ///
    /// If an edit fails to revert, the history no longer matches the
    /// document and is cleared.
    pub fn undo(&mut self, doc: &mut Document) -> Result<bool> {
        self.commit();
        let Some(mut group) = self.undo_stack.pop() else {
            return Ok(false);
        };
        for edit in group.iter_mut().rev() {
            if let Err(err) = doc.undo(edit) {
                warn!(%err, "undo failed, clearing history");
                self.clear();
                return Err(err);
            }
        }
        self.redo_stack.push(group);
        Ok(true)
    }

    /// Redo the last undone group. Returns false if there was nothing to
    /// redo.
    pub fn redo(&mut self, doc: &mut Document) -> Result<bool> {
        let Some(mut group) = self.redo_stack.pop() else {
            return Ok(false);
        };
        for edit in &mut group {
            if let Err(err) = doc.redo(edit) {
                warn!(%err, "redo failed, clearing history");
                self.clear();
                return Err(err);
            }
        }
        self.undo_stack.push(group);
        Ok(true)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || !self.current_group.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_group.clear();
    }
}
