//! Records of structural and attribute changes to elements.

use crate::attributes::AttributeSet;
use crate::element::tree::{ElementId, ElementTree};
use crate::error::Result;

/// Splice of one branch's child list: at `index`, `removed` was replaced
/// by `added`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementChange {
    element: ElementId,
    index: usize,
    removed: Vec<ElementId>,
    added: Vec<ElementId>,
}

impl ElementChange {
    #[must_use]
    pub fn new(
        element: ElementId,
        index: usize,
        removed: Vec<ElementId>,
        added: Vec<ElementId>,
    ) -> Self {
        Self {
            element,
            index,
            removed,
            added,
        }
    }

    /// The branch whose children changed.
    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Child index of the splice.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn children_added(&self) -> &[ElementId] {
        &self.added
    }

    #[must_use]
    pub fn children_removed(&self) -> &[ElementId] {
        &self.removed
    }

    /// Whether the branch currently holds `added` at `index`.
    #[must_use]
    pub fn is_applied(&self, tree: &ElementTree) -> bool {
        self.holds(tree, &self.added)
    }

    /// Whether the branch currently holds `removed` at `index`.
    #[must_use]
    pub fn is_reverted(&self, tree: &ElementTree) -> bool {
        self.holds(tree, &self.removed)
    }

    fn holds(&self, tree: &ElementTree, expected: &[ElementId]) -> bool {
        let children = tree.children(self.element);
        self.index
            .checked_add(expected.len())
            .and_then(|end| children.get(self.index..end))
            == Some(expected)
    }

    /// Put the removed children back.
    pub fn undo(&self, tree: &mut ElementTree) -> Result<()> {
        tree.replace(self.element, self.index, self.added.len(), &self.removed)?;
        Ok(())
    }

    /// Apply the splice again.
    pub fn redo(&self, tree: &mut ElementTree) -> Result<()> {
        tree.replace(self.element, self.index, self.removed.len(), &self.added)?;
        Ok(())
    }
}

/// Attribute replacement on one element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeChange {
    element: ElementId,
    old: AttributeSet,
    new: AttributeSet,
}

impl AttributeChange {
    #[must_use]
    pub fn new(element: ElementId, old: AttributeSet, new: AttributeSet) -> Self {
        Self { element, old, new }
    }

    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }

    #[must_use]
    pub fn old_attributes(&self) -> &AttributeSet {
        &self.old
    }

    #[must_use]
    pub fn new_attributes(&self) -> &AttributeSet {
        &self.new
    }

    #[must_use]
    pub fn is_applied(&self, tree: &ElementTree) -> bool {
        tree.attributes(self.element) == &self.new
    }

    #[must_use]
    pub fn is_reverted(&self, tree: &ElementTree) -> bool {
        tree.attributes(self.element) == &self.old
    }

    pub fn undo(&self, tree: &mut ElementTree) {
        tree.set_attributes(self.element, self.old.clone());
    }

    pub fn redo(&self, tree: &mut ElementTree) {
        tree.set_attributes(self.element, self.new.clone());
    }
}
