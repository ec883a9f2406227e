//! Styled document: content, paragraph structure and bidi runs kept in step.
//!
//! [`Document`] turns plain edits into edit scripts for the
//! [`ElementBuffer`], re-levels bidirectional text when needed and records
//! everything it did into one [`DocumentEdit`] per call.
//!
//! # Examples
//!
//! ```
//! use styledoc::{AttributeSet, Document};
//!
//! let mut doc = Document::new();
//! doc.insert_string(0, "first\nsecond", &AttributeSet::new()).unwrap();
//! assert_eq!(doc.text(), "first\nsecond");
//! assert_eq!(doc.tree().child_count(doc.default_root()), 2);
//!
//! let mut edit = doc.remove(5, 1).unwrap().unwrap();
//! assert_eq!(doc.text(), "firstsecond");
//! doc.undo(&mut edit).unwrap();
//! assert_eq!(doc.text(), "first\nsecond");
//! ```

use std::fmt;

use tracing::{debug, warn};

use crate::attributes::{
    AttributeSet, BIDI_ROOT_NAME, PARAGRAPH_ELEMENT_NAME, RunDirection, SECTION_ELEMENT_NAME,
};
use crate::document::edit::{DocumentEdit, EditKind};
use crate::element::{
    AttributeChange, ElementBuffer, ElementChange, ElementId, ElementSpec, ElementTree,
    SpecDirection, SpecKind,
};
use crate::error::{Error, Result};
use crate::event::{DocumentEvent, ListenerId, Listeners};
use crate::text::{ContentStore, DEFAULT_CAPACITY, Position, Segment};
use crate::unicode::{BidiResolver, BidiSegmenter, UnicodeBidiResolver, is_complex};

/// Options for creating a [`Document`].
#[derive(Clone, Debug)]
pub struct DocumentOptions {
    /// Initial capacity of the character store.
    pub initial_capacity: usize,
    /// Base direction for paragraphs that do not set their own.
    pub run_direction: Option<RunDirection>,
    /// Maintain bidi runs from the start rather than from the first
    /// right-to-left insertion.
    pub eager_bidi: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            run_direction: None,
            eager_bidi: false,
        }
    }
}

/// A mutable rich-text document.
///
/// The content always ends with an implied newline that
/// [`len`](Self::len) does not count. The default root is a section of
/// paragraphs of content runs; the bidi root is a flat list of runs of
/// equal embedding level. Both tile the whole content at all times.
pub struct Document {
    content: ContentStore,
    tree: ElementTree,
    root: ElementId,
    bidi_root: ElementId,
    resolver: Box<dyn BidiResolver>,
    run_direction: Option<RunDirection>,
    bidi_active: bool,
    listeners: Listeners,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.len())
            .field("elements", &self.tree.len())
            .field("run_direction", &self.run_direction)
            .field("bidi_active", &self.bidi_active)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty document with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DocumentOptions::default())
    }

    /// Create an empty document.
    #[must_use]
    pub fn with_options(options: DocumentOptions) -> Self {
        let mut content = ContentStore::with_text(options.initial_capacity, "\n");

        let mut tree = ElementTree::new();
        let root = tree.create_branch(None, AttributeSet::named(SECTION_ELEMENT_NAME));
        let paragraph = tree.create_branch(Some(root), AttributeSet::named(PARAGRAPH_ELEMENT_NAME));
        let (p0, p1) = (content.create_position(0), content.create_position(1));
        let leaf = tree.create_leaf(Some(paragraph), AttributeSet::new(), p0, p1);
        tree.append_child(paragraph, leaf);
        tree.append_child(root, paragraph);

        let bidi_root = tree.create_branch(None, AttributeSet::named(BIDI_ROOT_NAME));
        let (p0, p1) = (content.create_position(0), content.create_position(1));
        let run = tree.create_leaf(Some(bidi_root), AttributeSet::bidi_run(0), p0, p1);
        tree.append_child(bidi_root, run);

        Self {
            content,
            tree,
            root,
            bidi_root,
            resolver: Box::new(UnicodeBidiResolver),
            run_direction: options.run_direction,
            bidi_active: options.eager_bidi || options.run_direction == Some(RunDirection::Rtl),
            listeners: Listeners::default(),
        }
    }

    /// Replace the resolver used for later re-leveling.
    pub fn set_bidi_resolver(&mut self, resolver: impl BidiResolver + 'static) {
        self.resolver = Box::new(resolver);
    }

    #[must_use]
    pub fn run_direction(&self) -> Option<RunDirection> {
        self.run_direction
    }

    /// Set the document's base direction.
    ///
    /// Applies to paragraphs leveled by later edits; text already in the
    /// document keeps its runs.
    pub fn set_run_direction(&mut self, direction: Option<RunDirection>) {
        self.run_direction = direction;
        if direction == Some(RunDirection::Rtl) {
            self.activate_bidi();
        }
    }

    /// Whether bidi runs are being maintained.
    #[must_use]
    pub fn is_bidi_active(&self) -> bool {
        self.bidi_active
    }

    // ====================================================================
    // Queries
    // ====================================================================

    /// Number of characters, excluding the implied trailing newline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The document text without the implied trailing newline.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.string(0, self.len()).unwrap_or_default()
    }

    /// Copy `length` characters starting at `offset`.
    pub fn get_text(&self, offset: usize, length: usize) -> Result<String> {
        self.content.string(offset, length)
    }

    /// Fill `segment` with `length` characters starting at `offset`.
    pub fn get_chars<'a>(
        &'a self,
        offset: usize,
        length: usize,
        segment: &mut Segment<'a>,
    ) -> Result<()> {
        self.content.get_chars(offset, length, segment)
    }

    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    #[must_use]
    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    /// The section of paragraphs.
    #[must_use]
    pub fn default_root(&self) -> ElementId {
        self.root
    }

    /// The flat list of bidi runs.
    #[must_use]
    pub fn bidi_root(&self) -> ElementId {
        self.bidi_root
    }

    /// The paragraph containing `offset`.
    pub fn paragraph_element(&self, offset: usize) -> Result<ElementId> {
        self.tree.paragraph_at(self.root, offset)
    }

    /// The content run containing `offset`.
    pub fn character_element(&self, offset: usize) -> Result<ElementId> {
        self.tree.leaf_at(self.root, offset)
    }

    /// A position tracking `offset` through later edits.
    pub fn create_position(&mut self, offset: usize) -> Position {
        self.content.create_position(offset)
    }

    /// A position that stays at the start of the document.
    pub fn start_position(&mut self) -> Position {
        self.content.create_position(0)
    }

    /// A position that stays at the end of the document, after the implied
    /// newline.
    pub fn end_position(&mut self) -> Position {
        let end = self.content.len();
        self.content.create_position(end)
    }

    // ====================================================================
    // Listeners
    // ====================================================================

    /// Register `listener` to be called after every change, undo and redo.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&DocumentEvent<'_>) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    /// Returns false if `id` was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ====================================================================
    // Edits
    // ====================================================================

    /// Insert `text` at `offset` with character attributes `attrs`.
    ///
    /// Every newline ends a paragraph; new paragraphs take the attributes of
    /// the paragraph they are split from. Returns `None` for empty text.
    pub fn insert_string(
        &mut self,
        offset: usize,
        text: &str,
        attrs: &AttributeSet,
    ) -> Result<Option<DocumentEdit>> {
        if text.is_empty() {
            return Ok(None);
        }
        self.check_offset(offset)?;
        let chars: Vec<char> = text.chars().collect();
        if attrs.run_direction().is_some() || chars.iter().copied().any(is_complex) {
            self.activate_bidi();
        }

        let mut edit = DocumentEdit::new(EditKind::Insert, offset, chars.len());
        edit.push_content(self.content.insert_chars(offset, &chars)?);
        let result = self.apply_insert(&mut edit, attrs);
        self.finish(edit, result)
    }

    /// Insert the text of a hand-built edit script at `offset`.
    ///
    /// Content specs must carry their text. Returns `None` when the script
    /// holds no text.
    pub fn insert_specs(
        &mut self,
        offset: usize,
        specs: &[ElementSpec],
    ) -> Result<Option<DocumentEdit>> {
        if specs.is_empty() {
            return Ok(None);
        }
        self.check_offset(offset)?;
        let chars = script_text(specs)?;
        if chars.is_empty() {
            return Ok(None);
        }
        if chars.iter().copied().any(is_complex) {
            self.activate_bidi();
        }

        let mut edit = DocumentEdit::new(EditKind::Insert, offset, chars.len());
        edit.push_content(self.content.insert_chars(offset, &chars)?);
        let result = ElementBuffer::new(&mut self.tree, &mut self.content, self.root)
            .insert(offset, chars.len(), specs)
            .and_then(|changes| {
                edit.extend_elements(changes);
                self.update_bidi(&mut edit)
            });
        self.finish(edit, result)
    }

    /// Replace the whole document with the structure described by `specs`.
    ///
    /// A leading start tag supplies the root's attributes. Existing text is
    /// removed first; the removal is returned as its own edit ahead of the
    /// insertion.
    pub fn create(&mut self, specs: &[ElementSpec]) -> Result<Vec<DocumentEdit>> {
        let chars = script_text(specs)?;
        let mut edits = Vec::new();
        if !self.is_empty() {
            edits.extend(self.remove(0, self.len())?);
        }
        if chars.iter().copied().any(is_complex) {
            self.activate_bidi();
        }

        let mut edit = DocumentEdit::new(EditKind::Insert, 0, chars.len());
        let result = self
            .content
            .insert_chars(0, &chars)
            .and_then(|content_edit| {
                edit.push_content(content_edit);
                let (root_change, changes) =
                    ElementBuffer::new(&mut self.tree, &mut self.content, self.root)
                        .create(chars.len(), specs)?;
                edit.push_attribute(root_change);
                edit.extend_elements(changes);
                self.update_bidi(&mut edit)
            });
        match self.finish(edit, result) {
            Ok(created) => {
                edits.extend(created);
                Ok(edits)
            }
            Err(err) => {
                for removal in edits.iter_mut().rev() {
                    if let Err(undo) = self.undo(removal) {
                        warn!(%undo, "restoring text after failed create");
                    }
                }
                Err(err)
            }
        }
    }

    /// Remove `length` characters starting at `offset`.
    ///
    /// Returns `None` for a zero-length removal.
    pub fn remove(&mut self, offset: usize, length: usize) -> Result<Option<DocumentEdit>> {
        if length == 0 {
            return Ok(None);
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => {}
            _ => {
                return Err(Error::BadLocation {
                    offset,
                    length: self.len(),
                });
            }
        }

        let mut edit = DocumentEdit::new(EditKind::Remove, offset, length);
        let result = self.apply_remove(&mut edit);
        self.finish(edit, result)
    }

    /// Apply `attrs` to the content runs of `[offset, offset + length)`.
    ///
    /// With `replace` the runs' attributes are replaced, otherwise merged.
    /// Runs are split at the range ends first; afterwards adjacent runs
    /// with equal attributes around the range are merged.
    pub fn set_character_attributes(
        &mut self,
        offset: usize,
        length: usize,
        attrs: &AttributeSet,
        replace: bool,
    ) -> Result<Option<DocumentEdit>> {
        if length == 0 {
            return Ok(None);
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.content.len() => {}
            _ => {
                return Err(Error::BadLocation {
                    offset,
                    length: self.len(),
                });
            }
        }

        let mut edit = DocumentEdit::new(EditKind::Change, offset, length);
        let result = self.apply_character_attributes(&mut edit, attrs, replace);
        self.finish(edit, result)
    }

    /// Apply `attrs` to every paragraph overlapping
    /// `[offset, offset + length)`, or to the paragraph at `offset` when
    /// `length` is zero.
    ///
    /// Changing a paragraph's run direction re-levels its bidi runs.
    pub fn set_paragraph_attributes(
        &mut self,
        offset: usize,
        length: usize,
        attrs: &AttributeSet,
        replace: bool,
    ) -> Result<Option<DocumentEdit>> {
        self.check_offset(offset)?;
        let mut edit = DocumentEdit::new(EditKind::Change, offset, length);
        let result = self.apply_paragraph_attributes(&mut edit, attrs, replace);
        self.finish(edit, result)
    }

    /// Reclaim elements that are neither in the document nor retained by a
    /// live edit, along with their positions. Returns how many elements
    /// were reclaimed.
    ///
    /// Runs on its own as edits accumulate garbage.
    pub fn collect_garbage(&mut self) -> usize {
        let freed = self.tree.collect(&[self.root, self.bidi_root]);
        if freed > 0 {
            self.content.sweep_marks();
        }
        freed
    }

    /// Revert `edit` and notify listeners with the inverse event kind.
    ///
    /// Edits must be undone newest first. An edit whose changes are no
    /// longer in place fails with [`Error::CannotUndo`] and leaves the
    /// document untouched.
    pub fn undo(&mut self, edit: &mut DocumentEdit) -> Result<()> {
        edit.undo(&mut self.tree, &mut self.content)?;
        self.notify(edit.kind().inverse(), edit);
        Ok(())
    }

    /// Re-apply `edit` and notify listeners.
    ///
    /// Fails with [`Error::CannotRedo`] unless the document is in the state
    /// the edit was undone to.
    pub fn redo(&mut self, edit: &mut DocumentEdit) -> Result<()> {
        edit.redo(&mut self.tree, &mut self.content)?;
        self.notify(edit.kind(), edit);
        Ok(())
    }

    // ====================================================================
    // Internals
    // ====================================================================

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset > self.len() {
            return Err(Error::BadLocation {
                offset,
                length: self.len(),
            });
        }
        Ok(())
    }

    fn activate_bidi(&mut self) {
        if !self.bidi_active {
            debug!("bidi runs activated");
            self.bidi_active = true;
        }
    }

    fn notify(&self, kind: EditKind, edit: &DocumentEdit) {
        self.listeners.notify(&DocumentEvent::new(kind, edit));
    }

    /// Notify and hand out a finished edit, or revert a failed one.
    fn finish(&mut self, mut edit: DocumentEdit, result: Result<()>) -> Result<Option<DocumentEdit>> {
        match result {
            Ok(()) => {
                debug!(
                    kind = ?edit.kind(),
                    offset = edit.offset(),
                    length = edit.length(),
                    entries = edit.entries().len(),
                    "document edit"
                );
                edit.retain_elements(&mut self.tree);
                self.notify(edit.kind(), &edit);
                if self.tree.collect_due() {
                    self.collect_garbage();
                }
                Ok(Some(edit))
            }
            Err(err) => {
                debug!(kind = ?edit.kind(), offset = edit.offset(), %err, "document edit failed");
                if let Err(undo) = edit.undo(&mut self.tree, &mut self.content) {
                    warn!(%undo, "reverting failed edit");
                }
                drop(edit);
                self.collect_garbage();
                Err(err)
            }
        }
    }

    fn apply_insert(&mut self, edit: &mut DocumentEdit, attrs: &AttributeSet) -> Result<()> {
        let (offset, length) = (edit.offset(), edit.length());
        let specs = self.insert_script(offset, length, attrs)?;
        let changes =
            ElementBuffer::new(&mut self.tree, &mut self.content, self.root).insert(offset, length, &specs)?;
        edit.extend_elements(changes);
        self.update_bidi(edit)
    }

    fn apply_remove(&mut self, edit: &mut DocumentEdit) -> Result<()> {
        let (offset, length) = (edit.offset(), edit.length());
        let changes =
            ElementBuffer::new(&mut self.tree, &mut self.content, self.root).remove(offset, length)?;
        edit.extend_elements(changes);
        edit.push_content(self.content.remove(offset, length)?);
        self.update_bidi(edit)
    }

    fn apply_character_attributes(
        &mut self,
        edit: &mut DocumentEdit,
        attrs: &AttributeSet,
        replace: bool,
    ) -> Result<()> {
        let (offset, length) = (edit.offset(), edit.length());
        let end = offset + length;
        let splits =
            ElementBuffer::new(&mut self.tree, &mut self.content, self.root).change(offset, length)?;
        edit.extend_elements(splits);

        let mut pos = offset;
        while pos < end {
            let run = self.tree.leaf_at(self.root, pos)?;
            let run_end = self.tree.end_offset(run)?;
            if run_end <= pos {
                break;
            }
            let old = self.tree.attributes(run).clone();
            let new = if replace {
                old.replaced_by(attrs)
            } else {
                old.merge(attrs)
            };
            let change = AttributeChange::new(run, old, new);
            change.redo(&mut self.tree);
            edit.push_attribute(change);
            pos = run_end;
        }

        let merges = self.coalesce_runs(offset, end)?;
        edit.extend_elements(merges);
        Ok(())
    }

    fn apply_paragraph_attributes(
        &mut self,
        edit: &mut DocumentEdit,
        attrs: &AttributeSet,
        replace: bool,
    ) -> Result<()> {
        let offset = edit.offset();
        let last = (offset + edit.length().saturating_sub(1)).min(self.len());
        let mut direction_changed = false;
        let mut pos = offset;
        loop {
            let paragraph = self.tree.paragraph_at(self.root, pos)?;
            let old = self.tree.attributes(paragraph).clone();
            let new = if replace {
                old.replaced_by(attrs)
            } else {
                old.merge(attrs)
            };
            direction_changed |= old.run_direction() != new.run_direction();
            let change = AttributeChange::new(paragraph, old, new);
            change.redo(&mut self.tree);
            edit.push_attribute(change);

            let end = self.tree.end_offset(paragraph)?;
            if end > last || end <= pos {
                break;
            }
            pos = end;
        }

        if direction_changed {
            self.activate_bidi();
            self.update_bidi(edit)?;
        }
        Ok(())
    }

    /// Re-level the paragraphs touched by `edit` and record the change of
    /// the bidi root, if any.
    fn update_bidi(&mut self, edit: &mut DocumentEdit) -> Result<()> {
        if !self.bidi_active {
            return Ok(());
        }
        let mut segmenter = BidiSegmenter::new(
            &mut self.tree,
            &mut self.content,
            self.root,
            self.bidi_root,
            &*self.resolver,
        )
        .with_run_direction(self.run_direction);
        let change = match edit.kind() {
            EditKind::Remove => segmenter.update_paragraph(edit.offset())?,
            EditKind::Insert | EditKind::Change => {
                segmenter.update_range(edit.offset(), edit.length())?
            }
        };
        edit.extend_elements(change);
        Ok(())
    }

    /// Merge neighbouring runs with equal attributes in every paragraph
    /// touching `[start, end]`.
    fn coalesce_runs(&mut self, start: usize, end: usize) -> Result<Vec<ElementChange>> {
        let mut changes = Vec::new();
        let mut pos = start;
        loop {
            let paragraph = self.tree.paragraph_at(self.root, pos)?;
            changes.extend(self.coalesce_paragraph(paragraph, start, end)?);
            let paragraph_end = self.tree.end_offset(paragraph)?;
            if paragraph_end >= end || paragraph_end <= pos {
                break;
            }
            pos = paragraph_end;
        }
        Ok(changes)
    }

    fn coalesce_paragraph(
        &mut self,
        paragraph: ElementId,
        start: usize,
        end: usize,
    ) -> Result<Option<ElementChange>> {
        let children = self.tree.children(paragraph).to_vec();
        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < children.len() {
            let mut j = i + 1;
            if self.tree.is_leaf(children[i]) && self.touches(children[i], start, end)? {
                while j < children.len()
                    && self.tree.is_leaf(children[j])
                    && self.touches(children[j], start, end)?
                    && self.tree.attributes(children[j]) == self.tree.attributes(children[i])
                {
                    j += 1;
                }
            }
            groups.push((i, j));
            i = j;
        }

        let mut merged = groups.iter().filter(|(i, j)| j - i > 1);
        let Some(&(lo, _)) = merged.next() else {
            return Ok(None);
        };
        let hi = merged.last().map_or_else(
            || groups.iter().find(|g| g.0 == lo).map_or(lo + 1, |g| g.1),
            |g| g.1,
        );

        let mut added = Vec::new();
        for &(i, j) in groups.iter().filter(|g| g.0 >= lo && g.1 <= hi) {
            if j - i == 1 {
                added.push(children[i]);
                continue;
            }
            let attrs = self.tree.attributes(children[i]).clone();
            let p0 = self.content.create_position(self.tree.start_offset(children[i])?);
            let p1 = self.content.create_position(self.tree.end_offset(children[j - 1])?);
            added.push(self.tree.create_leaf(Some(paragraph), attrs, p0, p1));
        }
        let removed = children[lo..hi].to_vec();
        let change = ElementChange::new(paragraph, lo, removed, added);
        change.redo(&mut self.tree)?;
        Ok(Some(change))
    }

    fn touches(&self, run: ElementId, start: usize, end: usize) -> Result<bool> {
        Ok(self.tree.start_offset(run)? <= end && self.tree.end_offset(run)? >= start)
    }

    // ====================================================================
    // Edit scripts for plain text
    // ====================================================================

    /// Script for `length` characters already inserted at `offset`.
    fn insert_script(
        &self,
        offset: usize,
        length: usize,
        attrs: &AttributeSet,
    ) -> Result<Vec<ElementSpec>> {
        let end_offset = offset + length;
        // Paragraph attributes come from after the insertion, character
        // attributes from the insertion point.
        let paragraph = self.tree.paragraph_at(self.root, end_offset)?;
        let p_paragraph = self.tree.paragraph_at(self.root, offset)?;
        let run = self
            .tree
            .child(p_paragraph, self.tree.element_index(p_paragraph, offset))?;
        let at_boundary = self.tree.end_offset(run)? == end_offset;
        let cattr = self.tree.attributes(run);

        let mut specs = Vec::new();
        let mut last_start: Option<usize> = None;
        let mut after_newline = false;
        let mut after_newline_direction = SpecDirection::Originate;
        let mut pattr = self.tree.attributes(paragraph).clone();
        if offset > 0 && self.content.char_at(offset - 1) == Some('\n') {
            after_newline = true;
            after_newline_direction =
                self.specs_after_newline(paragraph, p_paragraph, &pattr, &mut specs, offset, end_offset)?;
            last_start = specs.iter().rposition(|s| s.kind() == SpecKind::StartTag);
        }
        if !after_newline {
            pattr = self.tree.attributes(p_paragraph).clone();
        }

        let mut segment = Segment::new();
        self.content.get_chars(offset, length, &mut segment)?;
        let text = segment.as_slice();
        let mut last = 0;
        for (i, &ch) in text.iter().enumerate() {
            if ch == '\n' {
                let brk = i + 1;
                specs.push(ElementSpec::content(attrs.clone(), brk - last));
                specs.push(ElementSpec::end_tag());
                specs.push(ElementSpec::start_tag(pattr.clone()));
                last_start = Some(specs.len() - 1);
                last = brk;
            }
        }
        if last < text.len() {
            specs.push(ElementSpec::content(attrs.clone(), text.len() - last));
        }

        if let Some(first) = specs.first_mut() {
            if first.kind() == SpecKind::Content && cattr == attrs {
                first.set_direction(SpecDirection::JoinPrevious);
            }
        }

        if let Some(index) = last_start {
            let direction = if after_newline {
                Some(after_newline_direction)
            } else if self.tree.end_offset(p_paragraph)? != end_offset {
                // Inserting mid-paragraph: continue into the fractured half.
                Some(SpecDirection::JoinFracture)
            } else {
                self.tree.parent(p_paragraph).and_then(|parent| {
                    let next = self
                        .tree
                        .child(parent, self.tree.element_index(parent, offset) + 1)
                        .ok()?;
                    (!self.tree.is_leaf(next)).then_some(SpecDirection::JoinNext)
                })
            };
            if let Some(direction) = direction {
                specs[index].set_direction(direction);
            }
        }

        let last_start_direction = last_start.map(|i| specs[i].direction());
        let doc_len = self.len();
        if at_boundary && end_offset < doc_len {
            let joins_next = match specs.last() {
                Some(last) => {
                    last.kind() == SpecKind::Content
                        && last.direction() != SpecDirection::JoinPrevious
                        && match last_start_direction {
                            None => paragraph == p_paragraph || after_newline,
                            Some(direction) => direction != SpecDirection::Originate,
                        }
                }
                None => false,
            };
            if joins_next {
                let next_run = self
                    .tree
                    .child(paragraph, self.tree.element_index(paragraph, end_offset))?;
                if self.tree.is_leaf(next_run) && self.tree.attributes(next_run) == attrs {
                    if let Some(last) = specs.last_mut() {
                        last.set_direction(SpecDirection::JoinNext);
                    }
                }
            }
        } else if !at_boundary && last_start_direction == Some(SpecDirection::JoinFracture) {
            if let Some(last) = specs.last_mut() {
                if last.kind() == SpecKind::Content
                    && last.direction() != SpecDirection::JoinPrevious
                    && attrs == cattr
                {
                    last.set_direction(SpecDirection::JoinNext);
                }
            }
        }
        Ok(specs)
    }

    /// Leading tags for an insertion right after a newline. Returns the
    /// direction for the last start tag.
    fn specs_after_newline(
        &self,
        paragraph: ElementId,
        p_paragraph: ElementId,
        pattr: &AttributeSet,
        specs: &mut Vec<ElementSpec>,
        offset: usize,
        end_offset: usize,
    ) -> Result<SpecDirection> {
        let parent = self.tree.parent(p_paragraph);
        if self.tree.parent(paragraph) == parent {
            specs.push(ElementSpec::end_tag());
            specs.push(ElementSpec::start_tag(pattr.clone()));
            if self.tree.end_offset(p_paragraph)? != end_offset {
                return Ok(SpecDirection::JoinFracture);
            }
            if let Some(parent) = parent {
                if self.tree.element_index(parent, offset) + 1 < self.tree.child_count(parent) {
                    return Ok(SpecDirection::JoinNext);
                }
            }
            return Ok(SpecDirection::Originate);
        }

        // Deeper trees: close up to the common ancestor, then open down to
        // the paragraph after the insertion.
        let mut left = Vec::new();
        let mut e = Some(p_paragraph);
        while let Some(id) = e {
            left.push(id);
            e = self.tree.parent(id);
        }
        let mut right = Vec::new();
        let mut left_index = None;
        let mut e = Some(paragraph);
        while let Some(id) = e {
            if let Some(i) = left.iter().position(|&l| l == id) {
                left_index = Some(i);
                break;
            }
            right.push(id);
            e = self.tree.parent(id);
        }
        let Some(left_index) = left_index else {
            return Ok(SpecDirection::Originate);
        };
        specs.extend((0..left_index).map(|_| ElementSpec::end_tag()));
        for (counter, &id) in right.iter().enumerate().rev() {
            let mut spec = ElementSpec::start_tag(self.tree.attributes(id).clone());
            if counter > 0 {
                spec.set_direction(SpecDirection::JoinNext);
            }
            specs.push(spec);
        }
        Ok(if right.is_empty() {
            SpecDirection::JoinFracture
        } else {
            SpecDirection::JoinNext
        })
    }
}

/// Concatenated text of the content specs in a script.
fn script_text(specs: &[ElementSpec]) -> Result<Vec<char>> {
    let mut chars = Vec::new();
    for spec in specs {
        if spec.length() == 0 {
            continue;
        }
        let text = spec
            .text()
            .ok_or_else(|| Error::invalid("content spec without text"))?;
        chars.extend_from_slice(text);
    }
    Ok(chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::CharacterFlags;

    fn plain() -> AttributeSet {
        AttributeSet::new()
    }

    fn bold() -> AttributeSet {
        AttributeSet::new().with_flags(CharacterFlags::BOLD)
    }

    fn runs(doc: &Document, paragraph: usize) -> Vec<(usize, usize)> {
        let para = doc.tree().child(doc.default_root(), paragraph).unwrap();
        doc.tree()
            .children(para)
            .iter()
            .map(|&r| {
                (
                    doc.tree().start_offset(r).unwrap(),
                    doc.tree().end_offset(r).unwrap(),
                )
            })
            .collect()
    }

    fn paragraphs(doc: &Document) -> Vec<(usize, usize)> {
        doc.tree()
            .children(doc.default_root())
            .iter()
            .map(|&p| {
                (
                    doc.tree().start_offset(p).unwrap(),
                    doc.tree().end_offset(p).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_default_structure() {
        let doc = Document::new();
        assert_eq!(doc.len(), 0);
        assert_eq!(doc.content().text(), "\n");
        assert_eq!(paragraphs(&doc), vec![(0, 1)]);
        assert_eq!(doc.tree().name(doc.default_root()), SECTION_ELEMENT_NAME);
        assert_eq!(doc.tree().child_count(doc.bidi_root()), 1);
        assert!(!doc.is_bidi_active());
    }

    #[test]
    fn test_insert_plain_text_joins_run() {
        let mut doc = Document::new();
        doc.insert_string(0, "hello", &plain()).unwrap();
        doc.insert_string(5, " world", &plain()).unwrap();
        assert_eq!(doc.text(), "hello world");
        assert_eq!(runs(&doc, 0), vec![(0, 12)]);
    }

    #[test]
    fn test_insert_styled_run_splits() {
        let mut doc = Document::new();
        doc.insert_string(0, "abcd", &plain()).unwrap();
        doc.insert_string(2, "XY", &bold()).unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 2), (2, 4), (4, 7)]);
        let middle = doc.character_element(2).unwrap();
        assert_eq!(doc.tree().attributes(middle), &bold());
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_insert_newlines_creates_paragraphs() {
        let mut doc = Document::new();
        let edit = doc.insert_string(0, "one\ntwo\nthree", &plain()).unwrap().unwrap();
        assert_eq!(paragraphs(&doc), vec![(0, 4), (4, 8), (8, 14)]);
        assert!(edit.change_for(doc.default_root()).is_some());
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_insert_newline_mid_paragraph() {
        let mut doc = Document::new();
        doc.insert_string(0, "abcdef", &plain()).unwrap();
        doc.insert_string(3, "\n", &plain()).unwrap();
        assert_eq!(doc.text(), "abc\ndef");
        assert_eq!(paragraphs(&doc), vec![(0, 4), (4, 8)]);
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_insert_after_newline() {
        let mut doc = Document::new();
        doc.insert_string(0, "ab\ncd", &plain()).unwrap();
        doc.insert_string(3, "X", &plain()).unwrap();
        assert_eq!(doc.text(), "ab\nXcd");
        assert_eq!(paragraphs(&doc), vec![(0, 3), (3, 7)]);
        assert_eq!(runs(&doc, 1), vec![(3, 7)]);
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_empty_insert_and_remove_are_noops() {
        let mut doc = Document::new();
        assert!(doc.insert_string(0, "", &plain()).unwrap().is_none());
        assert!(doc.remove(7, 0).unwrap().is_none());
    }

    #[test]
    fn test_bad_locations() {
        let mut doc = Document::new();
        doc.insert_string(0, "abc", &plain()).unwrap();
        let err = doc.insert_string(4, "x", &plain()).unwrap_err();
        assert!(err.is_bad_location());
        assert!(doc.remove(2, 2).unwrap_err().is_bad_location());
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_remove_across_paragraphs_joins_them() {
        let mut doc = Document::new();
        doc.insert_string(0, "ab\ncd", &plain()).unwrap();
        doc.remove(1, 3).unwrap();
        assert_eq!(doc.text(), "ad");
        assert_eq!(paragraphs(&doc), vec![(0, 3)]);
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_undo_redo_insert() {
        let mut doc = Document::new();
        let mut edit = doc.insert_string(0, "a\nb", &plain()).unwrap().unwrap();
        doc.undo(&mut edit).unwrap();
        assert_eq!(doc.text(), "");
        assert_eq!(paragraphs(&doc), vec![(0, 1)]);
        assert_eq!(doc.undo(&mut edit), Err(Error::CannotUndo));
        doc.redo(&mut edit).unwrap();
        assert_eq!(doc.text(), "a\nb");
        assert_eq!(paragraphs(&doc), vec![(0, 2), (2, 4)]);
    }

    #[test]
    fn test_character_attributes_and_coalescing() {
        let mut doc = Document::new();
        doc.insert_string(0, "hello", &plain()).unwrap();
        doc.set_character_attributes(1, 2, &bold(), false).unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 1), (1, 3), (3, 6)]);

        let edit = doc
            .set_character_attributes(1, 2, &plain(), true)
            .unwrap()
            .unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 6)]);
        assert_eq!(edit.attribute_changes().count(), 1);
    }

    #[test]
    fn test_character_attributes_undo_restores_runs() {
        let mut doc = Document::new();
        doc.insert_string(0, "hello", &plain()).unwrap();
        let mut edit = doc
            .set_character_attributes(0, 5, &bold(), false)
            .unwrap()
            .unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 5), (5, 6)]);
        doc.undo(&mut edit).unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 6)]);
        let run = doc.character_element(0).unwrap();
        assert!(doc.tree().attributes(run).is_empty());
    }

    #[test]
    fn test_remove_does_not_coalesce() {
        let mut doc = Document::new();
        doc.insert_string(0, "abXYcd", &plain()).unwrap();
        doc.set_character_attributes(2, 2, &bold(), false).unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 2), (2, 4), (4, 7)]);
        doc.remove(2, 2).unwrap();
        assert_eq!(runs(&doc, 0), vec![(0, 2), (2, 5)]);
    }

    #[test]
    fn test_paragraph_attributes() {
        let mut doc = Document::new();
        doc.insert_string(0, "a\nb\nc", &plain()).unwrap();
        let attrs = AttributeSet::new().with("align", "center");
        let edit = doc.set_paragraph_attributes(1, 2, &attrs, false).unwrap().unwrap();
        assert_eq!(edit.attribute_changes().count(), 2);
        let second = doc.paragraph_element(2).unwrap();
        assert_eq!(doc.tree().attributes(second).get("align"), Some("center"));
        assert_eq!(doc.tree().attributes(second).name(), Some(PARAGRAPH_ELEMENT_NAME));
        let third = doc.paragraph_element(4).unwrap();
        assert_eq!(doc.tree().attributes(third).get("align"), None);
    }

    #[test]
    fn test_hebrew_activates_bidi() {
        let mut doc = Document::new();
        doc.insert_string(0, "abc", &plain()).unwrap();
        assert!(!doc.is_bidi_active());
        let edit = doc.insert_string(3, " שלום", &plain()).unwrap().unwrap();
        assert!(doc.is_bidi_active());
        assert!(edit.change_for(doc.bidi_root()).is_some());
        let levels: Vec<u8> = doc
            .tree()
            .children(doc.bidi_root())
            .iter()
            .map(|&r| doc.tree().attributes(r).bidi_level().unwrap())
            .collect();
        assert_eq!(levels, vec![0, 1, 0]);
        doc.tree().check_contiguous(doc.bidi_root()).unwrap();
    }

    #[test]
    fn test_create_replaces_content() {
        let mut doc = Document::new();
        doc.insert_string(0, "old", &plain()).unwrap();
        let specs = vec![
            ElementSpec::start_tag(AttributeSet::new().with("kind", "body")),
            ElementSpec::start_tag(AttributeSet::named(PARAGRAPH_ELEMENT_NAME)),
            ElementSpec::content_with_text(bold(), "new\n"),
            ElementSpec::end_tag(),
        ];
        let edits = doc.create(&specs).unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].kind(), EditKind::Remove);
        assert_eq!(doc.text(), "new");
        assert_eq!(paragraphs(&doc), vec![(0, 4), (4, 5)]);
        let root_attrs = doc.tree().attributes(doc.default_root());
        assert_eq!(root_attrs.get("kind"), Some("body"));
        assert_eq!(root_attrs.name(), Some(SECTION_ELEMENT_NAME));
        doc.tree().check_contiguous(doc.default_root()).unwrap();
    }

    #[test]
    fn test_insert_specs_requires_text() {
        let mut doc = Document::new();
        let err = doc
            .insert_specs(0, &[ElementSpec::content(plain(), 3)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
        assert!(doc.insert_specs(0, &[ElementSpec::end_tag()]).unwrap().is_none());
        assert_eq!(doc.text(), "");
    }

    #[test]
    fn test_end_position_tracks_appends() {
        let mut doc = Document::new();
        let end = doc.end_position();
        let start = doc.start_position();
        doc.insert_string(0, "abc", &plain()).unwrap();
        assert_eq!(start.offset(), 0);
        assert_eq!(end.offset(), 4);
    }
}
