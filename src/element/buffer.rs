//! Reconciliation of edit scripts against the element tree.
//!
//! An [`ElementBuffer`] borrows the tree and the content store for the
//! duration of one edit. It walks the tree along the path to the edit,
//! collects per-branch splices while reading the script, and applies them
//! all at the end. Applying is all-or-nothing: if one splice fails, the
//! ones already made are reverted and every element created for the edit
//! is dropped.

use tracing::debug;

use crate::attributes::AttributeSet;
use crate::element::change::{AttributeChange, ElementChange};
use crate::element::spec::{ElementSpec, SpecDirection, SpecKind};
use crate::element::tree::{ElementId, ElementTree};
use crate::error::{Error, Result};
use crate::text::ContentStore;

/// Pending splice of one branch.
#[derive(Debug)]
struct ElemChanges {
    parent: ElementId,
    index: usize,
    added: Vec<ElementId>,
    removed: Vec<ElementId>,
    is_fracture: bool,
}

/// Applies edit scripts, removals and run splits to an [`ElementTree`].
pub struct ElementBuffer<'a> {
    tree: &'a mut ElementTree,
    content: &'a mut ContentStore,
    root: ElementId,

    pos: usize,
    offset: usize,
    length: usize,
    end_offset: usize,

    /// Every splice record of the current edit; the fields below index it.
    records: Vec<ElemChanges>,
    changes: Vec<usize>,
    path: Vec<usize>,
    insert_path: Vec<usize>,

    recreate_leafs: bool,
    created_fracture: bool,
    fractured_parent: Option<ElementId>,
    fractured_child: Option<ElementId>,
    offset_last_index: bool,
    offset_last_index_on_replace: bool,
}

impl<'a> ElementBuffer<'a> {
    /// Create a buffer editing the subtree under `root`.
    pub fn new(tree: &'a mut ElementTree, content: &'a mut ContentStore, root: ElementId) -> Self {
        Self {
            tree,
            content,
            root,
            pos: 0,
            offset: 0,
            length: 0,
            end_offset: 0,
            records: Vec::new(),
            changes: Vec::new(),
            path: Vec::new(),
            insert_path: Vec::new(),
            recreate_leafs: false,
            created_fracture: false,
            fractured_parent: None,
            fractured_child: None,
            offset_last_index: false,
            offset_last_index_on_replace: false,
        }
    }

    /// Restructure the tree for `length` characters already inserted into
    /// the content at `offset`, as described by `specs`.
    pub fn insert(
        mut self,
        offset: usize,
        length: usize,
        specs: &[ElementSpec],
    ) -> Result<Vec<ElementChange>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        if specs.is_empty() {
            return Err(Error::invalid("empty edit script"));
        }
        let checkpoint = self.tree.checkpoint();
        self.begin_edits(offset, length);
        let result = self.insert_update(specs).and_then(|()| self.end_edits());
        self.finish("insert", checkpoint, result)
    }

    /// Restructure the tree for the removal of `[offset, offset + length)`.
    ///
    /// Must run before the characters are taken out of the content.
    pub fn remove(mut self, offset: usize, length: usize) -> Result<Vec<ElementChange>> {
        let checkpoint = self.tree.checkpoint();
        self.begin_edits(offset, length);
        let root = self.root;
        let result = self
            .remove_elements(root, offset, offset + length)
            .and_then(|_| self.end_edits());
        self.finish("remove", checkpoint, result)
    }

    /// Split leaves so that `[offset, offset + length)` starts and ends on
    /// leaf boundaries.
    pub fn change(mut self, offset: usize, length: usize) -> Result<Vec<ElementChange>> {
        let checkpoint = self.tree.checkpoint();
        self.begin_edits(offset, length);
        let result = self.change_update().and_then(|()| self.end_edits());
        self.finish("change", checkpoint, result)
    }

    /// Rebuild the tree from a script describing the whole content.
    ///
    /// A leading start tag supplies the root's attributes; the replaced
    /// root attributes are returned alongside the splices.
    pub fn create(
        mut self,
        length: usize,
        specs: &[ElementSpec],
    ) -> Result<(AttributeChange, Vec<ElementChange>)> {
        let checkpoint = self.tree.checkpoint();
        let root = self.root;
        let old_attrs = self.tree.attributes(root).clone();
        self.begin_edits(0, length);
        let result = self
            .create_update(specs)
            .and_then(|attrs| Ok((attrs, self.end_edits()?)));
        match result {
            Ok((attrs, changes)) => {
                debug!(length, changes = changes.len(), "element buffer create");
                Ok((AttributeChange::new(root, old_attrs, attrs), changes))
            }
            Err(err) => {
                debug!(length, %err, "element buffer create failed");
                self.tree.set_attributes(root, old_attrs);
                self.tree.discard_since(checkpoint);
                Err(err)
            }
        }
    }

    fn finish(
        self,
        op: &'static str,
        checkpoint: u64,
        result: Result<Vec<ElementChange>>,
    ) -> Result<Vec<ElementChange>> {
        match result {
            Ok(changes) => {
                debug!(
                    op,
                    offset = self.offset,
                    length = self.length,
                    changes = changes.len(),
                    "element buffer edit"
                );
                Ok(changes)
            }
            Err(err) => {
                debug!(op, offset = self.offset, %err, "element buffer edit failed");
                self.tree.discard_since(checkpoint);
                Err(err)
            }
        }
    }

    fn begin_edits(&mut self, offset: usize, length: usize) {
        self.offset = offset;
        self.length = length;
        self.end_offset = offset + length;
        self.pos = offset;
        self.records.clear();
        self.changes.clear();
        self.path.clear();
        self.insert_path.clear();
        self.fractured_parent = None;
        self.fractured_child = None;
        self.offset_last_index = false;
        self.offset_last_index_on_replace = false;
    }

    /// Apply every collected splice, reverting on failure.
    fn end_edits(&mut self) -> Result<Vec<ElementChange>> {
        let mut applied: Vec<ElementChange> = Vec::with_capacity(self.changes.len());
        for &ec in &self.changes {
            let record = &self.records[ec];
            let change = ElementChange::new(
                record.parent,
                record.index,
                record.removed.clone(),
                record.added.clone(),
            );
            if let Err(err) = change.redo(self.tree) {
                for done in applied.iter().rev() {
                    if let Err(rollback) = done.undo(self.tree) {
                        tracing::warn!(%rollback, "reverting element splice failed");
                    }
                }
                return Err(err);
            }
            applied.push(change);
        }
        self.changes.clear();
        self.path.clear();
        Ok(applied)
    }

    // ====================================================================
    // Path bookkeeping
    // ====================================================================

    fn push(&mut self, parent: ElementId, index: usize, is_fracture: bool) {
        self.records.push(ElemChanges {
            parent,
            index,
            added: Vec::new(),
            removed: Vec::new(),
            is_fracture,
        });
        self.path.push(self.records.len() - 1);
    }

    fn pop(&mut self) -> Result<()> {
        let ec = self
            .path
            .pop()
            .ok_or_else(|| Error::invalid("unbalanced end tag"))?;
        let record = &self.records[ec];
        if !record.added.is_empty() || !record.removed.is_empty() {
            self.changes.push(ec);
        } else if let Some(&top) = self.path.last() {
            // A branch pushed but never filled must not be added.
            let unused = record.parent;
            if self.tree.child_count(unused) == 0 {
                self.records[top].added.retain(|&e| e != unused);
            }
        }
        Ok(())
    }

    fn pop_all(&mut self) -> Result<()> {
        while !self.path.is_empty() {
            self.pop()?;
        }
        Ok(())
    }

    fn peek(&self) -> Result<usize> {
        self.path
            .last()
            .copied()
            .ok_or_else(|| Error::invalid("element path is empty"))
    }

    fn leaf(&mut self, parent: ElementId, attrs: AttributeSet, start: usize, end: usize) -> ElementId {
        let p0 = self.content.create_position(start);
        let p1 = self.content.create_position(end);
        self.tree.create_leaf(Some(parent), attrs, p0, p1)
    }

    fn start_of(&self, id: ElementId) -> Result<usize> {
        self.tree.start_offset(id)
    }

    fn end_of(&self, id: ElementId) -> Result<usize> {
        self.tree.end_offset(id)
    }

    fn attrs_of(&self, id: ElementId) -> AttributeSet {
        self.tree.attributes(id).clone()
    }

    // ====================================================================
    // Insertion
    // ====================================================================

    fn insert_update(&mut self, specs: &[ElementSpec]) -> Result<()> {
        let mut elem = self.root;
        let mut index = self.tree.element_index(elem, self.offset);
        while !self.tree.is_leaf(elem) {
            let child = self.tree.child(elem, index)?;
            let at = if self.tree.is_leaf(child) { index } else { index + 1 };
            self.push(elem, at, false);
            elem = child;
            index = self.tree.element_index(elem, self.offset);
        }

        self.insert_path = self.path.clone();
        self.created_fracture = false;
        self.recreate_leafs = false;

        let mut first = 0;
        if specs[0].kind() == SpecKind::Content {
            self.insert_first_content(specs)?;
            self.pos += specs[0].length();
            first = 1;
        } else {
            self.fracture_deepest_leaf()?;
        }

        for spec in &specs[first..] {
            self.insert_element(spec)?;
        }

        if !self.created_fracture {
            self.fracture(None)?;
        }

        self.pop_all()?;

        if self.offset_last_index && self.offset_last_index_on_replace {
            if let Some(&last) = self.insert_path.last() {
                self.records[last].index += 1;
            }
        }

        // Every branch on the original path that changed gets a splice.
        for counter in (0..self.insert_path.len()).rev() {
            let ec = self.insert_path[counter];
            if Some(self.records[ec].parent) == self.fractured_parent {
                if let Some(child) = self.fractured_child {
                    self.records[ec].added.push(child);
                }
            }
            let record = &self.records[ec];
            if (!record.added.is_empty() || !record.removed.is_empty())
                && !self.changes.contains(&ec)
            {
                self.changes.push(ec);
            }
        }

        // Leading end tags at offset 0 leave the first element of the
        // closed branch empty; drop it.
        if self.offset == 0
            && self.fractured_parent.is_some()
            && specs[0].kind() == SpecKind::EndTag
        {
            let closed = specs
                .iter()
                .take_while(|s| s.kind() == SpecKind::EndTag)
                .count();
            let depth = self
                .insert_path
                .len()
                .checked_sub(closed + 1)
                .ok_or_else(|| Error::invalid("more end tags than open branches"))?;
            let ec = self.insert_path[depth];
            let index = self.records[ec]
                .index
                .checked_sub(1)
                .ok_or_else(|| Error::invalid("no element before the insertion point"))?;
            let empty = self.tree.child(self.records[ec].parent, index)?;
            let record = &mut self.records[ec];
            record.index = index;
            record.removed.insert(0, empty);
        }
        Ok(())
    }

    fn insert_first_content(&mut self, specs: &[ElementSpec]) -> Result<()> {
        let first = &specs[0];
        let ec = self.peek()?;
        let (parent, index) = (self.records[ec].parent, self.records[ec].index);
        let child = self.tree.child(parent, index)?;
        let first_end = self.offset + first.length();
        let only_content = specs.len() == 1;

        match first.direction() {
            SpecDirection::JoinPrevious => {
                let child_end = self.end_of(child)?;
                if child_end != first_end && !only_content {
                    // Left part with the new content; the rest is
                    // recreated by the fracture.
                    let start = self.start_of(child)?;
                    let attrs = self.attrs_of(child);
                    let joined = self.leaf(parent, attrs, start, first_end);
                    self.records[ec].added.push(joined);
                    self.records[ec].removed.push(child);
                    if child_end != self.end_offset {
                        self.recreate_leafs = true;
                    } else {
                        self.offset_last_index = true;
                    }
                } else {
                    self.offset_last_index = true;
                    self.offset_last_index_on_replace = true;
                }
            }
            SpecDirection::JoinNext => {
                if self.offset != 0 {
                    let start = self.start_of(child)?;
                    let attrs = self.attrs_of(child);
                    let left = self.leaf(parent, attrs, start, self.offset);
                    self.records[ec].added.push(left);

                    let next = self.tree.child(parent, index + 1)?;
                    let next_attrs = self.attrs_of(next);
                    let end = if only_content {
                        self.end_of(next)?
                    } else {
                        first_end
                    };
                    let joined = self.leaf(parent, next_attrs, self.offset, end);
                    let record = &mut self.records[ec];
                    record.added.push(joined);
                    record.removed.push(child);
                    record.removed.push(next);
                }
            }
            _ => {
                let start = self.start_of(child)?;
                let end = self.end_of(child)?;
                if start != self.offset {
                    let attrs = self.attrs_of(child);
                    let left = self.leaf(parent, attrs, start, self.offset);
                    self.records[ec].added.push(left);
                }
                self.records[ec].removed.push(child);
                let created = self.leaf(parent, first.attributes().clone(), self.offset, first_end);
                self.records[ec].added.push(created);
                if end != self.end_offset {
                    self.recreate_leafs = true;
                } else {
                    self.offset_last_index = true;
                }
            }
        }
        Ok(())
    }

    /// Split the leaf at the insertion point when the script opens with a
    /// tag. The right part is recreated by the fracture.
    fn fracture_deepest_leaf(&mut self) -> Result<()> {
        let ec = self.peek()?;
        let (parent, index) = (self.records[ec].parent, self.records[ec].index);
        let child = self.tree.child(parent, index)?;
        if self.offset != 0 {
            let start = self.start_of(child)?;
            let attrs = self.attrs_of(child);
            let left = self.leaf(parent, attrs, start, self.offset);
            self.records[ec].added.push(left);
        }
        self.records[ec].removed.push(child);
        if self.end_of(child)? != self.end_offset {
            self.recreate_leafs = true;
        } else {
            self.offset_last_index = true;
        }
        Ok(())
    }

    fn insert_element(&mut self, spec: &ElementSpec) -> Result<()> {
        let ec = self.peek()?;
        let (parent, index) = (self.records[ec].parent, self.records[ec].index);
        match spec.kind() {
            SpecKind::StartTag => match spec.direction() {
                SpecDirection::JoinNext => {
                    let mut target = self.tree.child(parent, index)?;
                    if self.tree.is_leaf(target) {
                        if index + 1 < self.tree.child_count(parent) {
                            target = self.tree.child(parent, index + 1)?;
                        } else {
                            return Err(Error::invalid("join next onto a leaf"));
                        }
                    }
                    // Treated like a fracture so a trailing join-next
                    // content run lands in its first child.
                    self.push(target, 0, true);
                }
                SpecDirection::JoinFracture => {
                    if !self.created_fracture {
                        self.fracture(self.path.len().checked_sub(1))?;
                    }
                    if self.records[ec].is_fracture {
                        let first = self.tree.child(parent, 0)?;
                        self.push(first, 0, true);
                    } else {
                        let fractured = self
                            .fractured_child
                            .ok_or_else(|| Error::invalid("join fracture without a fracture"))?;
                        self.push(fractured, 0, true);
                    }
                }
                _ => {
                    let branch = self
                        .tree
                        .create_branch(Some(parent), spec.attributes().clone());
                    self.records[ec].added.push(branch);
                    self.push(branch, 0, false);
                }
            },
            SpecKind::EndTag => self.pop()?,
            SpecKind::Content => {
                let len = spec.length();
                if spec.direction() != SpecDirection::JoinNext {
                    let leaf = self.leaf(parent, spec.attributes().clone(), self.pos, self.pos + len);
                    self.records[ec].added.push(leaf);
                } else {
                    let first = if self.records[ec].is_fracture {
                        self.tree.child(parent, 0)?
                    } else {
                        // On the original path (but not its bottom) the
                        // next element is the one the path descended into.
                        let on_path = self
                            .insert_path
                            .iter()
                            .rposition(|&c| c == ec)
                            .is_some_and(|at| at + 1 != self.insert_path.len());
                        if on_path {
                            self.tree.child(parent, index)?
                        } else {
                            self.tree.child(parent, index + 1)?
                        }
                    };
                    let attrs = self.attrs_of(first);
                    let end = self.end_of(first)?;
                    let joined = self.leaf(parent, attrs, self.pos, end);
                    let record = &mut self.records[ec];
                    record.added.push(joined);
                    record.removed.push(first);
                }
                self.pos += len;
            }
        }
        Ok(())
    }

    // ====================================================================
    // Fracture
    // ====================================================================

    /// Decide whether the elements right of the insertion point must be
    /// recreated, and from which depth.
    fn fracture(&mut self, depth: Option<usize>) -> Result<()> {
        let depth_count = self.insert_path.len();
        let Some(&last_change) = self.insert_path.last() else {
            return Err(Error::invalid("fracture without an insertion path"));
        };
        let mut last_index: Option<usize> = None;
        let mut need_recreate = self.recreate_leafs;
        let last = &self.records[last_change];
        let mut child_altered = last.index + 1 < self.tree.child_count(last.parent);
        let mut deepest_altered = need_recreate.then_some(depth_count);
        let mut last_altered = depth_count - 1;

        self.created_fracture = true;
        for counter in (0..depth_count - 1).rev() {
            let change = &self.records[self.insert_path[counter]];
            if !change.added.is_empty() || Some(counter) == depth {
                last_index = Some(counter);
                if !need_recreate && child_altered {
                    need_recreate = true;
                    if deepest_altered.is_none() {
                        deepest_altered = Some(last_altered + 1);
                    }
                }
            }
            if !child_altered && change.index < self.tree.child_count(change.parent) {
                child_altered = true;
                last_altered = counter;
            }
        }
        if need_recreate {
            self.fracture_from(
                last_index.unwrap_or(depth_count - 1),
                deepest_altered.unwrap_or(depth_count),
            )?;
        }
        Ok(())
    }

    /// Recreate everything right of the insertion point, from path depth
    /// `start_index` down to `end_fracture_index`.
    fn fracture_from(&mut self, start_index: usize, end_fracture_index: usize) -> Result<()> {
        let path_len = self.insert_path.len();
        let change = &self.records[self.insert_path[start_index]];
        let (parent, index) = (change.parent, change.index);

        let child = if start_index + 1 == path_len {
            self.tree.child(parent, index)?
        } else {
            self.tree.child(parent, before(index)?)?
        };
        let new_child = self.duplicate(parent, child)?;
        self.fractured_parent = Some(parent);
        self.fractured_child = Some(new_child);

        let mut fracture_parent = new_child;
        let mut depth = start_index + 1;
        while depth < end_fracture_index {
            let is_end = depth + 1 == end_fracture_index;
            let is_end_leaf = depth + 1 == path_len;
            let ec = self.insert_path[depth];
            let (cparent, cindex) = (self.records[ec].parent, self.records[ec].index);

            // The element to duplicate. Nothing at the end of the fracture,
            // or when a join previous already covered it.
            let child = if is_end {
                if self.offset_last_index || !is_end_leaf {
                    None
                } else {
                    Some(self.tree.child(cparent, cindex)?)
                }
            } else {
                Some(self.tree.child(cparent, before(cindex)?)?)
            };
            let new_child = match child {
                Some(c) => Some(self.duplicate(fracture_parent, c)?),
                None => None,
            };

            let count = self.tree.child_count(cparent);
            let remaining = count
                .checked_sub(cindex)
                .ok_or(Error::StructuralBounds {
                    index: cindex,
                    count,
                })?;
            let mut kids = Vec::new();
            let (move_start, move_count) = match new_child {
                None if is_end_leaf => (cindex + 1, remaining.saturating_sub(1)),
                None => (cindex, remaining),
                Some(nc) => {
                    kids.push(nc);
                    if is_end {
                        (cindex + 1, remaining.saturating_sub(1))
                    } else {
                        (cindex, remaining)
                    }
                }
            };
            for at in move_start..move_start + move_count {
                let to_move = self.tree.child(cparent, at)?;
                let recreated = self.recreate_fractured(fracture_parent, to_move)?;
                kids.push(recreated);
                self.records[ec].removed.push(to_move);
            }
            self.tree.replace(fracture_parent, 0, 0, &kids)?;
            match new_child {
                Some(nc) => fracture_parent = nc,
                None => break,
            }
            depth += 1;
        }
        Ok(())
    }

    /// Empty copy of a branch, or the part of a leaf right of the edit.
    fn duplicate(&mut self, parent: ElementId, child: ElementId) -> Result<ElementId> {
        let attrs = self.attrs_of(child);
        if self.tree.is_leaf(child) {
            let start = self.start_of(child)?.max(self.end_offset);
            let end = self.end_of(child)?;
            Ok(self.leaf(parent, attrs, start, end))
        } else {
            Ok(self.tree.create_branch(Some(parent), attrs))
        }
    }

    fn recreate_fractured(&mut self, parent: ElementId, original: ElementId) -> Result<ElementId> {
        let attrs = self.attrs_of(original);
        if self.tree.is_leaf(original) {
            let start = self.start_of(original)?.max(self.end_offset);
            let end = self.end_of(original)?;
            return Ok(self.leaf(parent, attrs, start, end));
        }
        let branch = self.tree.create_branch(Some(parent), attrs);
        let children = self.tree.children(original).to_vec();
        let mut kids = Vec::with_capacity(children.len());
        for child in children {
            kids.push(self.recreate_fractured(branch, child)?);
        }
        self.tree.replace(branch, 0, 0, &kids)?;
        Ok(branch)
    }

    // ====================================================================
    // Removal
    // ====================================================================

    /// Returns true when `elem` ends up with no children.
    fn remove_elements(&mut self, elem: ElementId, rm0: usize, rm1: usize) -> Result<bool> {
        if self.tree.is_leaf(elem) {
            return Ok(false);
        }
        let index0 = self.tree.element_index(elem, rm0);
        let index1 = self.tree.element_index(elem, rm1);
        self.push(elem, index0, false);
        let ec = self.peek()?;

        if index0 == index1 {
            let child0 = self.tree.child(elem, index0)?;
            if rm0 <= self.start_of(child0)? && rm1 >= self.end_of(child0)? {
                self.records[ec].removed.push(child0);
            } else if self.remove_elements(child0, rm0, rm1)? {
                self.records[ec].removed.push(child0);
            }
        } else {
            let child0 = self.tree.child(elem, index0)?;
            let child1 = self.tree.child(elem, index1)?;
            let contains_end = rm1 < self.end_of(elem)?;
            if contains_end && self.can_join(Some(child0), Some(child1)) {
                for i in index0..=index1 {
                    let removed = self.tree.child(elem, i)?;
                    self.records[ec].removed.push(removed);
                }
                let joined = self.join(elem, child0, child1, rm0, rm1)?;
                self.records[ec].added.push(joined);
            } else {
                // Remove the interior and forward to the end points.
                let mut rm_index0 = index0 + 1;
                let mut rm_index1 = index1 - 1;
                let mut left = Some(child0);
                let mut right = Some(child1);
                let (c0_start, c0_end) = (self.start_of(child0)?, self.end_of(child0)?);
                if c0_start == rm0 || (index0 == 0 && c0_start > rm0 && c0_end <= rm1) {
                    // Start element completely consumed.
                    left = None;
                    rm_index0 = index0;
                }
                if !contains_end {
                    right = None;
                    rm_index1 += 1;
                } else if self.start_of(child1)? == rm1 {
                    // End element untouched.
                    right = None;
                }
                if rm_index0 <= rm_index1 {
                    self.records[ec].index = rm_index0;
                }
                for i in rm_index0..=rm_index1 {
                    let removed = self.tree.child(elem, i)?;
                    self.records[ec].removed.push(removed);
                }
                if let Some(c0) = left {
                    if self.remove_elements(c0, rm0, rm1)? {
                        let record = &mut self.records[ec];
                        record.removed.insert(0, c0);
                        record.index = index0;
                    }
                }
                if let Some(c1) = right {
                    if self.remove_elements(c1, rm0, rm1)? {
                        self.records[ec].removed.push(c1);
                    }
                }
            }
        }

        self.pop()?;

        let record = &self.records[ec];
        let count = self.tree.child_count(elem);
        Ok(record.removed.len() >= record.added.len()
            && count == record.removed.len() - record.added.len())
    }

    /// Leaves join when their attributes match, branches when their names
    /// do. A leaf never joins a branch.
    fn can_join(&self, e0: Option<ElementId>, e1: Option<ElementId>) -> bool {
        let (Some(e0), Some(e1)) = (e0, e1) else {
            return false;
        };
        let leaf0 = self.tree.is_leaf(e0);
        if leaf0 != self.tree.is_leaf(e1) {
            return false;
        }
        if leaf0 {
            self.tree.attributes(e0) == self.tree.attributes(e1)
        } else {
            self.tree.name(e0) == self.tree.name(e1)
        }
    }

    fn join(
        &mut self,
        parent: ElementId,
        left: ElementId,
        right: ElementId,
        rm0: usize,
        rm1: usize,
    ) -> Result<ElementId> {
        let (left_leaf, right_leaf) = (self.tree.is_leaf(left), self.tree.is_leaf(right));
        if left_leaf && right_leaf {
            let attrs = self.attrs_of(left);
            let start = self.start_of(left)?;
            let end = self.end_of(right)?;
            return Ok(self.leaf(parent, attrs, start, end));
        }
        if left_leaf || right_leaf {
            return Err(Error::invalid("cannot join a leaf with a branch"));
        }

        // Keep the children of `left` before the removal and those of
        // `right` after it, joining the two edge children if possible.
        let to = self.tree.create_branch(Some(parent), self.attrs_of(left));
        let lj_index = self.tree.element_index(left, rm0);
        let rj_index = self.tree.element_index(right, rm1);
        let mut lj = Some(self.tree.child(left, lj_index)?);
        if let Some(l) = lj {
            if self.start_of(l)? >= rm0 {
                lj = None;
            }
        }
        let mut rj = Some(self.tree.child(right, rj_index)?);
        if let Some(r) = rj {
            if self.start_of(r)? == rm1 {
                rj = None;
            }
        }

        let mut children = Vec::new();
        for i in 0..lj_index {
            let kept = self.tree.child(left, i)?;
            children.push(self.clone_element(to, kept)?);
        }
        match (lj, rj) {
            (Some(l), Some(r)) if self.can_join(lj, rj) => {
                children.push(self.join(to, l, r, rm0, rm1)?);
            }
            _ => {
                if let Some(l) = lj {
                    children.push(self.clone_as_necessary(to, l, rm0, rm1)?);
                }
                if let Some(r) = rj {
                    children.push(self.clone_as_necessary(to, r, rm0, rm1)?);
                }
            }
        }
        let first_right = if rj.is_none() { rj_index } else { rj_index + 1 };
        for i in first_right..self.tree.child_count(right) {
            let kept = self.tree.child(right, i)?;
            children.push(self.clone_element(to, kept)?);
        }
        self.tree.replace(to, 0, 0, &children)?;
        Ok(to)
    }

    /// Deep copy of `clonee` under `parent`.
    pub fn clone_element(&mut self, parent: ElementId, clonee: ElementId) -> Result<ElementId> {
        let attrs = self.attrs_of(clonee);
        if self.tree.is_leaf(clonee) {
            let start = self.start_of(clonee)?;
            let end = self.end_of(clonee)?;
            return Ok(self.leaf(parent, attrs, start, end));
        }
        let branch = self.tree.create_branch(Some(parent), attrs);
        let originals = self.tree.children(clonee).to_vec();
        let mut kids = Vec::with_capacity(originals.len());
        for child in originals {
            kids.push(self.clone_element(branch, child)?);
        }
        self.tree.replace(branch, 0, 0, &kids)?;
        Ok(branch)
    }

    /// Deep copy of `clonee` leaving out children entirely inside
    /// `[rm0, rm1]`.
    fn clone_as_necessary(
        &mut self,
        parent: ElementId,
        clonee: ElementId,
        rm0: usize,
        rm1: usize,
    ) -> Result<ElementId> {
        let attrs = self.attrs_of(clonee);
        if self.tree.is_leaf(clonee) {
            let start = self.start_of(clonee)?;
            let end = self.end_of(clonee)?;
            return Ok(self.leaf(parent, attrs, start, end));
        }
        let branch = self.tree.create_branch(Some(parent), attrs);
        let originals = self.tree.children(clonee).to_vec();
        let mut kids = Vec::with_capacity(originals.len());
        for child in originals {
            if self.start_of(child)? < rm0 || self.end_of(child)? > rm1 {
                kids.push(self.clone_as_necessary(branch, child, rm0, rm1)?);
            }
        }
        self.tree.replace(branch, 0, 0, &kids)?;
        Ok(branch)
    }

    // ====================================================================
    // Run splitting
    // ====================================================================

    fn change_update(&mut self) -> Result<()> {
        let did_end = self.split(self.offset, self.length)?;
        if !did_end {
            self.pop_all()?;
            self.split(self.offset + self.length, 0)?;
        }
        self.pop_all()
    }

    /// Split the leaf containing `offs` there. Returns true when the
    /// other end of `[offs, offs + len)` was handled too.
    fn split(&mut self, offs: usize, len: usize) -> Result<bool> {
        let mut split_end = false;
        let mut e = self.root;
        let mut index = self.tree.element_index(e, offs);
        while !self.tree.is_leaf(e) {
            self.push(e, index, false);
            e = self.tree.child(e, index)?;
            index = self.tree.element_index(e, offs);
        }

        let ec = self.peek()?;
        let (parent, index0) = (self.records[ec].parent, self.records[ec].index);
        let child = self.tree.child(parent, index0)?;
        let (child_start, child_end) = (self.start_of(child)?, self.end_of(child)?);
        if !(child_start < offs && offs < child_end) {
            return Ok(false);
        }

        let mut index1 = index0;
        if offs + len < self.end_of(parent)? && len != 0 {
            index1 = self.tree.element_index(parent, offs + len);
            if index1 == index0 {
                // Three-way split of a single leaf.
                let attrs = self.attrs_of(child);
                let a = self.leaf(parent, attrs.clone(), child_start, offs);
                let b = self.leaf(parent, attrs.clone(), offs, offs + len);
                let c = self.leaf(parent, attrs, offs + len, child_end);
                let record = &mut self.records[ec];
                record.removed.push(child);
                record.added.extend([a, b, c]);
                return Ok(true);
            }
            let end_child = self.tree.child(parent, index1)?;
            if offs + len == self.start_of(end_child)? {
                index1 = index0;
            }
            split_end = true;
        }

        self.pos = offs;
        let attrs = self.attrs_of(child);
        let a = self.leaf(parent, attrs.clone(), child_start, offs);
        let b = self.leaf(parent, attrs, offs, child_end);
        {
            let record = &mut self.records[ec];
            record.removed.push(child);
            record.added.extend([a, b]);
        }

        for i in index0 + 1..index1 {
            let middle = self.tree.child(parent, i)?;
            let record = &mut self.records[ec];
            record.removed.push(middle);
            record.added.push(middle);
        }

        if index1 != index0 {
            let end_child = self.tree.child(parent, index1)?;
            self.pos = offs + len;
            let attrs = self.attrs_of(end_child);
            let (start, end) = (self.start_of(end_child)?, self.end_of(end_child)?);
            let a = self.leaf(parent, attrs.clone(), start, self.pos);
            let b = self.leaf(parent, attrs, self.pos, end);
            let record = &mut self.records[ec];
            record.removed.push(end_child);
            record.added.extend([a, b]);
        }
        Ok(split_end)
    }

    // ====================================================================
    // Creation
    // ====================================================================

    /// Returns the root attributes installed by the script.
    fn create_update(&mut self, specs: &[ElementSpec]) -> Result<AttributeSet> {
        // Recreate the trailing element so it starts after the new text.
        let mut elem = self.root;
        let mut index = self.tree.element_index(elem, 0);
        while !self.tree.is_leaf(elem) {
            let child = self.tree.child(elem, index)?;
            self.push(elem, index, false);
            elem = child;
            index = self.tree.element_index(elem, 0);
        }
        let ec = self.peek()?;
        let (parent, at) = (self.records[ec].parent, self.records[ec].index);
        let child = self.tree.child(parent, at)?;
        let attrs = self.attrs_of(child);
        let end = self.end_of(child)?;
        let doc_len = self.content.len().saturating_sub(1);
        let trailing = self.leaf(parent, attrs, doc_len, end);
        self.records[ec].added.push(trailing);
        self.records[ec].removed.push(child);
        while self.path.len() > 1 {
            self.pop()?;
        }

        let root_attrs = match specs.first() {
            Some(spec) if spec.kind() == SpecKind::StartTag => spec.attributes().clone(),
            _ => AttributeSet::new(),
        };
        let root = self.root;
        let installed = self.tree.attributes(root).replaced_by(&root_attrs);
        self.tree.set_attributes(root, installed.clone());

        for spec in specs.iter().skip(1) {
            self.insert_element(spec)?;
        }
        self.pop_all()?;
        Ok(installed)
    }
}

fn before(index: usize) -> Result<usize> {
    index
        .checked_sub(1)
        .ok_or_else(|| Error::invalid("no element before the insertion point"))
}
