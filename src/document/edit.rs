//! Undoable record of one logical document edit.

use std::sync::Arc;

use tracing::warn;

use crate::element::{AttributeChange, ElementChange, ElementId, ElementTree, RetainedElements};
use crate::error::{Error, Result};
use crate::text::{ContentEdit, ContentStore};

/// What a [`DocumentEdit`] did to the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditKind {
    Insert,
    Remove,
    /// Attributes changed; the text did not.
    Change,
}

impl EditKind {
    /// The kind of the edit that reverses this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Insert => Self::Remove,
            Self::Remove => Self::Insert,
            Self::Change => Self::Change,
        }
    }
}

/// One step of a [`DocumentEdit`].
#[derive(Debug)]
pub enum EditEntry {
    Content(ContentEdit),
    Element(ElementChange),
    Attribute(AttributeChange),
}

impl EditEntry {
    fn undo(&mut self, tree: &mut ElementTree, content: &mut ContentStore) -> Result<()> {
        match self {
            Self::Content(edit) => edit.undo(content),
            Self::Element(change) if change.is_applied(tree) => change.undo(tree),
            Self::Attribute(change) if change.is_applied(tree) => {
                change.undo(tree);
                Ok(())
            }
            Self::Element(_) | Self::Attribute(_) => Err(Error::CannotUndo),
        }
    }

    fn redo(&mut self, tree: &mut ElementTree, content: &mut ContentStore) -> Result<()> {
        match self {
            Self::Content(edit) => edit.redo(content),
            Self::Element(change) if change.is_reverted(tree) => change.redo(tree),
            Self::Attribute(change) if change.is_reverted(tree) => {
                change.redo(tree);
                Ok(())
            }
            Self::Element(_) | Self::Attribute(_) => Err(Error::CannotRedo),
        }
    }

    fn elements(&self) -> Vec<ElementId> {
        match self {
            Self::Content(_) => Vec::new(),
            Self::Element(change) => std::iter::once(change.element())
                .chain(change.children_removed().iter().copied())
                .chain(change.children_added().iter().copied())
                .collect(),
            Self::Attribute(change) => vec![change.element()],
        }
    }
}

/// The content, structure and attribute changes made by one logical edit.
///
/// Starts out done. [`undo`](Self::undo) replays the entries backwards,
/// [`redo`](Self::redo) forwards; each is only legal in the opposite
/// state, and only while the document is in the state the edit left it
/// in. Edits sharing a document must be undone newest first.
#[derive(Debug)]
pub struct DocumentEdit {
    kind: EditKind,
    offset: usize,
    length: usize,
    entries: Vec<EditEntry>,
    done: bool,
    retained: Option<Arc<RetainedElements>>,
}

impl DocumentEdit {
    #[must_use]
    pub fn new(kind: EditKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
            entries: Vec::new(),
            done: true,
            retained: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EditKind {
        self.kind
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of characters inserted, removed or restyled.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn entries(&self) -> &[EditEntry] {
        &self.entries
    }

    /// Append an entry. Elements it refers to are only kept alive by
    /// [`retain_elements`](Self::retain_elements) calls made afterwards.
    pub fn push(&mut self, entry: EditEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn push_content(&mut self, edit: ContentEdit) {
        self.entries.push(EditEntry::Content(edit));
    }

    pub(crate) fn extend_elements(&mut self, changes: impl IntoIterator<Item = ElementChange>) {
        self.entries
            .extend(changes.into_iter().map(EditEntry::Element));
    }

    pub(crate) fn push_attribute(&mut self, change: AttributeChange) {
        self.entries.push(EditEntry::Attribute(change));
    }

    /// Structural changes, in the order they were applied.
    pub fn element_changes(&self) -> impl Iterator<Item = &ElementChange> {
        self.entries.iter().filter_map(|entry| match entry {
            EditEntry::Element(change) => Some(change),
            _ => None,
        })
    }

    /// Attribute changes, in the order they were applied.
    pub fn attribute_changes(&self) -> impl Iterator<Item = &AttributeChange> {
        self.entries.iter().filter_map(|entry| match entry {
            EditEntry::Attribute(change) => Some(change),
            _ => None,
        })
    }

    /// The structural change recorded for `element`, if any.
    #[must_use]
    pub fn change_for(&self, element: ElementId) -> Option<&ElementChange> {
        self.element_changes().find(|c| c.element() == element)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.done
    }

    /// Keep every element this edit refers to alive in `tree` for as long
    /// as the edit exists.
    pub fn retain_elements(&mut self, tree: &mut ElementTree) {
        let ids = self.entries.iter().flat_map(EditEntry::elements).collect();
        self.retained = Some(tree.retain(ids));
    }

    /// Reverse every entry, last first.
    ///
    /// Fails with [`Error::CannotUndo`] when the document no longer matches
    /// what the edit did, after putting back any entries already reversed.
    pub fn undo(&mut self, tree: &mut ElementTree, content: &mut ContentStore) -> Result<()> {
        if !self.done {
            return Err(Error::CannotUndo);
        }
        for i in (0..self.entries.len()).rev() {
            if let Err(err) = self.entries[i].undo(tree, content) {
                for entry in &mut self.entries[i + 1..] {
                    if let Err(restore) = entry.redo(tree, content) {
                        warn!(%restore, "re-applying entry after failed undo");
                    }
                }
                return Err(err);
            }
        }
        self.done = false;
        Ok(())
    }

    /// Apply every entry again, first first.
    ///
    /// Fails with [`Error::CannotRedo`] when the document no longer matches
    /// the state the edit was undone to.
    pub fn redo(&mut self, tree: &mut ElementTree, content: &mut ContentStore) -> Result<()> {
        if self.done {
            return Err(Error::CannotRedo);
        }
        for i in 0..self.entries.len() {
            if let Err(err) = self.entries[i].redo(tree, content) {
                for entry in self.entries[..i].iter_mut().rev() {
                    if let Err(restore) = entry.undo(tree, content) {
                        warn!(%restore, "reverting entry after failed redo");
                    }
                }
                return Err(err);
            }
        }
        self.done = true;
        Ok(())
    }
}
