//! Arena of branch and leaf elements.
//!
//! Elements are addressed by generational [`ElementId`] handles. Elements
//! taken out of the tree stay addressable for as long as an undoable edit
//! retains them, so undo can put them back; everything else that is no
//! longer reachable from a root is reclaimed by [`ElementTree::collect`].
//! Structural changes always splice a branch's child list through
//! [`ElementTree::replace`]; nodes are never edited in place except for
//! their attributes.

use std::fmt::Write as _;
use std::sync::{Arc, Weak};

use crate::attributes::{AttributeSet, CONTENT_ELEMENT_NAME, PARAGRAPH_ELEMENT_NAME};
use crate::error::{Error, Result};
use crate::text::Position;

/// Arena growth below which collection is never due.
const MIN_COLLECT_INTERVAL: usize = 64;

/// Handle to an element in an [`ElementTree`].
///
/// A handle outlives its element once the element is reclaimed; the tree
/// then reads it as a detached, empty branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    index: u32,
    generation: u32,
}

impl ElementId {
    /// Arena slot of this element.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
enum NodeKind {
    Branch { children: Vec<ElementId> },
    Leaf { start: Position, end: Position },
}

#[derive(Debug)]
struct Node {
    parent: Option<ElementId>,
    attrs: AttributeSet,
    kind: NodeKind,
}

/// What a reclaimed or foreign handle reads as.
static VACANT: Node = Node {
    parent: None,
    attrs: AttributeSet::new(),
    kind: NodeKind::Branch {
        children: Vec::new(),
    },
};

#[derive(Debug)]
struct Slot {
    generation: u32,
    /// Creation stamp, for discarding the elements of a failed edit.
    serial: u64,
    node: Option<Node>,
}

/// Elements an undoable edit may splice back into the tree.
///
/// The tree keeps them, and everything below them, alive until the last
/// handle is dropped.
#[derive(Debug)]
pub struct RetainedElements {
    ids: Vec<ElementId>,
}

impl RetainedElements {
    #[must_use]
    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }
}

/// Storage for every element of a document, live or detached.
#[derive(Debug, Default)]
pub struct ElementTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    serial: u64,
    created_since_collect: usize,
    live_after_collect: usize,
    retained: Vec<Weak<RetainedElements>>,
}

impl ElementTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored elements, including detached ones not yet
    /// collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether `id` still refers to a stored element.
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    /// Stamp to pass to [`discard_since`](Self::discard_since).
    pub(crate) fn checkpoint(&self) -> u64 {
        self.serial
    }

    /// Drop every element created after `checkpoint`.
    ///
    /// Only valid when nothing reachable refers to the dropped elements.
    pub(crate) fn discard_since(&mut self, checkpoint: u64) {
        let mut dropped = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.serial > checkpoint && slot.node.is_some() {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(slot_index(index));
                dropped += 1;
            }
        }
        self.live -= dropped;
    }

    /// Keep `ids` and their subtrees alive for as long as the returned
    /// handle is.
    pub fn retain(&mut self, ids: Vec<ElementId>) -> Arc<RetainedElements> {
        let held = Arc::new(RetainedElements { ids });
        self.retained.retain(|r| r.strong_count() > 0);
        self.retained.push(Arc::downgrade(&held));
        held
    }

    /// Whether enough elements were created since the last collection to
    /// make another one worthwhile.
    #[must_use]
    pub fn collect_due(&self) -> bool {
        self.created_since_collect > self.live_after_collect.max(MIN_COLLECT_INTERVAL)
    }

    /// Reclaim every element that is neither reachable from `roots` nor
    /// retained. Returns how many were reclaimed.
    ///
    /// Reclaimed leaves release their positions.
    pub fn collect(&mut self, roots: &[ElementId]) -> usize {
        self.retained.retain(|r| r.strong_count() > 0);
        let mut stack: Vec<ElementId> = roots.to_vec();
        for held in self.retained.iter().filter_map(Weak::upgrade) {
            stack.extend_from_slice(&held.ids);
        }

        let mut reachable = vec![false; self.slots.len()];
        while let Some(id) = stack.pop() {
            if !self.contains(id) || reachable[id.index()] {
                continue;
            }
            reachable[id.index()] = true;
            stack.extend_from_slice(self.children(id));
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.is_some() && !reachable[index] {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(slot_index(index));
                freed += 1;
            }
        }
        self.live -= freed;
        self.created_since_collect = 0;
        self.live_after_collect = self.live;
        if freed > 0 {
            tracing::trace!(freed, live = self.live, "collected detached elements");
        }
        freed
    }

    fn push(&mut self, node: Node) -> ElementId {
        self.serial += 1;
        self.live += 1;
        self.created_since_collect += 1;
        let serial = self.serial;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.serial = serial;
            slot.node = Some(node);
            return ElementId {
                index,
                generation: slot.generation,
            };
        }
        let index = slot_index(self.slots.len());
        self.slots.push(Slot {
            generation: 0,
            serial,
            node: Some(node),
        });
        ElementId {
            index,
            generation: 0,
        }
    }

    fn get(&self, id: ElementId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: ElementId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node(&self, id: ElementId) -> &Node {
        self.get(id).unwrap_or(&VACANT)
    }

    /// Create a branch with no children.
    pub fn create_branch(&mut self, parent: Option<ElementId>, attrs: AttributeSet) -> ElementId {
        self.push(Node {
            parent,
            attrs,
            kind: NodeKind::Branch {
                children: Vec::new(),
            },
        })
    }

    /// Create a leaf spanning `[start, end)`.
    pub fn create_leaf(
        &mut self,
        parent: Option<ElementId>,
        attrs: AttributeSet,
        start: Position,
        end: Position,
    ) -> ElementId {
        self.push(Node {
            parent,
            attrs,
            kind: NodeKind::Leaf { start, end },
        })
    }

    #[must_use]
    pub fn is_leaf(&self, id: ElementId) -> bool {
        matches!(self.node(id).kind, NodeKind::Leaf { .. })
    }

    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn attributes(&self, id: ElementId) -> &AttributeSet {
        &self.node(id).attrs
    }

    /// Reclaimed elements are left alone.
    pub fn set_attributes(&mut self, id: ElementId, attrs: AttributeSet) {
        if let Some(node) = self.get_mut(id) {
            node.attrs = attrs;
        }
    }

    /// Element name: the explicit one, else `paragraph` for branches and
    /// `content` for leaves.
    #[must_use]
    pub fn name(&self, id: ElementId) -> &str {
        let node = self.node(id);
        node.attrs.name().unwrap_or(match node.kind {
            NodeKind::Branch { .. } => PARAGRAPH_ELEMENT_NAME,
            NodeKind::Leaf { .. } => CONTENT_ELEMENT_NAME,
        })
    }

    /// Children of a branch. Leaves have none.
    #[must_use]
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        match &self.node(id).kind {
            NodeKind::Branch { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    #[must_use]
    pub fn child_count(&self, id: ElementId) -> usize {
        self.children(id).len()
    }

    /// Child at `index`.
    pub fn child(&self, id: ElementId, index: usize) -> Result<ElementId> {
        let children = self.children(id);
        children
            .get(index)
            .copied()
            .ok_or(Error::StructuralBounds {
                index,
                count: children.len(),
            })
    }

    /// The positions bounding a leaf.
    #[must_use]
    pub fn leaf_positions(&self, id: ElementId) -> Option<(&Position, &Position)> {
        match &self.node(id).kind {
            NodeKind::Leaf { start, end } => Some((start, end)),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Start offset. A branch starts where its first child starts.
    pub fn start_offset(&self, id: ElementId) -> Result<usize> {
        match &self.node(id).kind {
            NodeKind::Leaf { start, .. } => Ok(start.offset()),
            NodeKind::Branch { children } => match children.first() {
                Some(&first) => self.start_offset(first),
                None => Err(Error::Precondition("range of a branch with no children")),
            },
        }
    }

    /// End offset. A branch ends where its last child ends.
    pub fn end_offset(&self, id: ElementId) -> Result<usize> {
        match &self.node(id).kind {
            NodeKind::Leaf { end, .. } => Ok(end.offset()),
            NodeKind::Branch { children } => match children.last() {
                Some(&last) => self.end_offset(last),
                None => Err(Error::Precondition("range of a branch with no children")),
            },
        }
    }

    /// Index of the child that contains `offset`.
    ///
    /// Offsets in a hole between children map to the child ending at or
    /// before them. Offsets before the first child map to 0, offsets at or
    /// past the end to the last child. Leaves and empty branches yield 0.
    #[must_use]
    pub fn element_index(&self, id: ElementId, offset: usize) -> usize {
        let children = self.children(id);
        let count = children.len();
        if count == 0 {
            return 0;
        }
        let end_of = |c: ElementId| self.end_offset(c).unwrap_or(0);
        let start_of = |c: ElementId| self.start_offset(c).unwrap_or(0);
        if offset >= end_of(children[count - 1]) {
            return count - 1;
        }
        if offset < start_of(children[0]) {
            return 0;
        }
        let i = children.partition_point(|&c| end_of(c) <= offset);
        if i >= count {
            count - 1
        } else if start_of(children[i]) <= offset || i == 0 {
            i
        } else {
            i - 1
        }
    }

    /// Replace `remove_count` children of `id` starting at `index` with
    /// `added`. Returns the removed children.
    ///
    /// Added children are re-parented to `id`.
    pub fn replace(
        &mut self,
        id: ElementId,
        index: usize,
        remove_count: usize,
        added: &[ElementId],
    ) -> Result<Vec<ElementId>> {
        if !added.iter().all(|&c| self.contains(c)) {
            return Err(Error::invalid("added child is not in this tree"));
        }
        let Some(node) = self.get_mut(id) else {
            return Err(Error::invalid("branch is not in this tree"));
        };
        let NodeKind::Branch { children } = &mut node.kind else {
            return Err(Error::invalid("cannot replace children of a leaf"));
        };
        let count = children.len();
        let end = index.checked_add(remove_count);
        let Some(end) = end.filter(|&end| index <= count && end <= count) else {
            return Err(Error::StructuralBounds {
                index: index.max(index.saturating_add(remove_count)),
                count,
            });
        };
        let removed: Vec<ElementId> = children.splice(index..end, added.iter().copied()).collect();
        for &child in added {
            if let Some(node) = self.get_mut(child) {
                node.parent = Some(id);
            }
        }
        Ok(removed)
    }

    /// Append `child` to the branch `id`. Leaves are left untouched.
    pub(crate) fn append_child(&mut self, id: ElementId, child: ElementId) {
        let Some(Node {
            kind: NodeKind::Branch { children },
            ..
        }) = self.get_mut(id)
        else {
            return;
        };
        children.push(child);
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(id);
        }
    }

    /// Deepest leaf under `root` containing `offset`.
    pub fn leaf_at(&self, root: ElementId, offset: usize) -> Result<ElementId> {
        let mut elem = root;
        while !self.is_leaf(elem) {
            let index = self.element_index(elem, offset);
            elem = self.child(elem, index)?;
        }
        Ok(elem)
    }

    /// Parent of the leaf under `root` containing `offset`.
    pub fn paragraph_at(&self, root: ElementId, offset: usize) -> Result<ElementId> {
        let leaf = self.leaf_at(root, offset)?;
        self.parent(leaf)
            .ok_or_else(|| Error::invalid("leaf without a parent"))
    }

    /// Verify that every branch under `id` is non-empty and that its
    /// children tile its range without holes or overlaps.
    pub fn check_contiguous(&self, id: ElementId) -> Result<()> {
        let start = self.start_offset(id)?;
        let end = self.end_offset(id)?;
        if start > end {
            return Err(Error::invalid(format!(
                "{} ends at {end} before it starts at {start}",
                self.name(id)
            )));
        }
        let children = self.children(id);
        let mut expected = start;
        for &child in children {
            self.check_contiguous(child)?;
            let child_start = self.start_offset(child)?;
            if child_start != expected {
                return Err(Error::invalid(format!(
                    "{} child starts at {child_start}, expected {expected}",
                    self.name(id)
                )));
            }
            if self.parent(child) != Some(id) {
                return Err(Error::invalid("child has a stale parent link"));
            }
            expected = self.end_offset(child)?;
        }
        Ok(())
    }

    /// Indented outline of the subtree under `id`, one element per line.
    #[must_use]
    pub fn dump(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: ElementId, depth: usize, out: &mut String) {
        let _ = write!(out, "{:indent$}{}", "", self.name(id), indent = depth * 2);
        if let Some((start, end)) = self.leaf_positions(id) {
            let _ = write!(out, " [{},{})", start.offset(), end.offset());
        }
        let attrs = self.attributes(id);
        if !attrs.flags().is_empty() {
            let names: Vec<&str> = attrs.flags().iter_names().map(|(name, _)| name).collect();
            let _ = write!(out, " flags={}", names.join("|"));
        }
        if let Some(level) = attrs.bidi_level() {
            let _ = write!(out, " level={level}");
        }
        if let Some(direction) = attrs.run_direction() {
            let _ = write!(out, " dir={direction:?}");
        }
        out.push('\n');
        for &child in self.children(id) {
            self.dump_into(child, depth + 1, out);
        }
    }
}

fn slot_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}
