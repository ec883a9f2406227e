//! Character content with live positions and undoable edits.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::text::gap::{DEFAULT_CAPACITY, GapBuffer};
use crate::text::marks::{self, GapWindow, MarkRegistry, Position, UndoPosition};
use crate::text::segment::Segment;

/// Gap buffer plus the marks that track offsets into it.
///
/// All offsets and lengths count `char`s.
///
/// # Examples
///
/// ```
/// use styledoc::ContentStore;
///
/// let mut store = ContentStore::new();
/// store.insert(0, "01234").unwrap();
/// let pos = store.create_position(4);
/// store.remove(1, 2).unwrap();
/// assert_eq!(store.text(), "034");
/// assert_eq!(pos.offset(), 2);
/// ```
#[derive(Debug)]
pub struct ContentStore {
    buffer: GapBuffer,
    marks: MarkRegistry,
    window: Arc<GapWindow>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    /// Create an empty store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty store whose gap initially spans `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let buffer = GapBuffer::with_capacity(capacity);
        let window = Arc::new(GapWindow::new(buffer.gap_start(), buffer.gap_end()));
        Self {
            buffer,
            marks: MarkRegistry::new(),
            window,
        }
    }

    /// Create a store holding `text`, starting from a gap of `capacity`
    /// slots.
    #[must_use]
    pub fn with_text(capacity: usize, text: &str) -> Self {
        let mut store = Self::with_capacity(capacity);
        let chars: Vec<char> = text.chars().collect();
        store.insert_raw(0, &chars);
        store
    }

    /// Number of characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Physical array size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The underlying gap buffer.
    #[must_use]
    pub fn buffer(&self) -> &GapBuffer {
        &self.buffer
    }

    /// Number of registered marks, live or not yet swept.
    #[must_use]
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    /// Drop marks no position refers to. Returns how many were removed.
    pub fn sweep_marks(&mut self) -> usize {
        self.marks.sweep()
    }

    /// Insert `text` at `offset`.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<ContentEdit> {
        let chars: Vec<char> = text.chars().collect();
        self.insert_chars(offset, &chars)
    }

    /// Insert `chars` at `offset`.
    pub fn insert_chars(&mut self, offset: usize, chars: &[char]) -> Result<ContentEdit> {
        self.check_offset(offset)?;
        self.insert_raw(offset, chars);
        Ok(ContentEdit::new(ContentEditKind::Insert, offset, chars.to_vec()))
    }

    /// Remove `length` characters starting at `offset`.
    ///
    /// A zero-length removal is a no-op at any offset.
    pub fn remove(&mut self, offset: usize, length: usize) -> Result<ContentEdit> {
        if length == 0 {
            return Ok(ContentEdit::new(ContentEditKind::Remove, offset, Vec::new()));
        }
        self.check_range(offset, length)?;
        let text = self.buffer.collect_range(offset, offset + length);
        let positions = self.marks.capture(&self.window, offset, length);
        self.remove_raw(offset, length);
        let mut edit = ContentEdit::new(ContentEditKind::Remove, offset, text);
        edit.positions = positions;
        Ok(edit)
    }

    /// Fill `segment` with `length` characters starting at `offset`.
    ///
    /// Ranges on one side of the gap are borrowed. Ranges straddling the gap
    /// are copied, unless the segment accepts partial returns, in which case
    /// only the part before the gap is handed out.
    pub fn get_chars<'a>(
        &'a self,
        offset: usize,
        length: usize,
        segment: &mut Segment<'a>,
    ) -> Result<()> {
        self.check_range(offset, length)?;
        let end = offset + length;
        let gap_start = self.buffer.gap_start();
        let array = self.buffer.array();
        if end <= gap_start {
            segment.borrow_from(array, offset, length);
        } else if offset >= gap_start {
            segment.borrow_from(array, offset + self.buffer.gap_len(), length);
        } else if segment.is_partial_return() {
            segment.borrow_from(array, offset, gap_start - offset);
        } else {
            segment.copy_from(self.buffer.collect_range(offset, end));
        }
        Ok(())
    }

    /// Copy `length` characters starting at `offset` into a `String`.
    pub fn string(&self, offset: usize, length: usize) -> Result<String> {
        self.check_range(offset, length)?;
        Ok(self
            .buffer
            .collect_range(offset, offset + length)
            .into_iter()
            .collect())
    }

    /// The whole content.
    #[must_use]
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Character at `offset`, if any.
    #[must_use]
    pub fn char_at(&self, offset: usize) -> Option<char> {
        if offset >= self.len() {
            return None;
        }
        Some(self.buffer.array()[self.buffer.physical_index(offset)])
    }

    /// Create a position that tracks `offset` through later edits.
    ///
    /// Offsets past the end are clamped to it and follow appended text.
    /// Positions created at the same offset share a mark.
    pub fn create_position(&mut self, offset: usize) -> Position {
        let offset = offset.min(self.len());
        let gap_start = self.buffer.gap_start();
        let index = if offset < gap_start || (gap_start == 0 && offset == 0) {
            offset
        } else {
            offset + self.buffer.gap_len()
        };
        let mark = self.marks.mark_at(index);
        marks::position(mark, &self.window)
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset > self.len() {
            return Err(Error::BadLocation {
                offset,
                length: self.len(),
            });
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(Error::BadLocation {
                offset,
                length: self.len(),
            }),
        }
    }

    fn publish(&self) {
        self.window
            .publish(self.buffer.gap_start(), self.buffer.gap_end());
    }

    fn shift_gap(&mut self, new_start: usize) {
        let (old_start, old_end) = (self.buffer.gap_start(), self.buffer.gap_end());
        self.buffer.shift_gap(new_start);
        self.marks.gap_shifted(old_start, old_end, new_start);
        self.marks
            .reset_at_zero(self.buffer.gap_start(), self.buffer.gap_end());
    }

    fn shift_end(&mut self, required: usize) {
        let old_end = self.buffer.gap_end();
        let new_end = self.buffer.shift_end(required);
        self.marks.end_shifted(old_end, new_end);
    }

    fn shift_gap_start_down(&mut self, new_start: usize) {
        self.marks.gap_start_lowered(
            new_start,
            self.buffer.gap_start(),
            self.buffer.gap_end(),
        );
        self.buffer.shift_gap_start_down(new_start);
        self.marks
            .reset_at_zero(self.buffer.gap_start(), self.buffer.gap_end());
    }

    fn shift_gap_end_up(&mut self, new_end: usize) {
        self.marks.gap_end_raised(self.buffer.gap_end(), new_end);
        self.buffer.shift_gap_end_up(new_end);
        self.marks
            .reset_at_zero(self.buffer.gap_start(), self.buffer.gap_end());
    }

    /// Insert without validation or undo bookkeeping.
    fn insert_raw(&mut self, offset: usize, chars: &[char]) {
        if chars.is_empty() {
            return;
        }
        self.shift_gap(offset);
        if chars.len() >= self.buffer.gap_len() {
            let required = self.buffer.capacity() - self.buffer.gap_len() + chars.len();
            self.shift_end(required);
        }
        self.buffer.fill_gap(chars);
        self.publish();
    }

    /// Remove without validation or undo bookkeeping.
    fn remove_raw(&mut self, offset: usize, length: usize) {
        if length == 0 {
            return;
        }
        let end = offset + length;
        let gap_start = self.buffer.gap_start();
        if end <= gap_start {
            if gap_start != end {
                self.shift_gap(end);
            }
            self.shift_gap_start_down(self.buffer.gap_start() - length);
        } else if offset >= gap_start {
            if gap_start != offset {
                self.shift_gap(offset);
            }
            self.shift_gap_end_up(self.buffer.gap_end() + length);
        } else {
            let new_end = self.buffer.gap_len() + end;
            self.shift_gap_start_down(offset);
            self.shift_gap_end_up(new_end);
        }
        self.publish();
    }

    fn capture_positions(&self, offset: usize, length: usize) -> Vec<UndoPosition> {
        self.marks.capture(&self.window, offset, length)
    }

    fn restore_positions(&mut self, positions: &[UndoPosition], offset: usize, length: usize) {
        let gap_end = self.buffer.gap_end();
        self.marks.restore(positions, offset, length, gap_end);
    }
}

/// Whether a [`ContentEdit`] recorded an insertion or a removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEditKind {
    Insert,
    Remove,
}

/// Undoable record of one content insertion or removal.
///
/// Starts out undoable. After [`undo`](Self::undo) it can only be redone,
/// after [`redo`](Self::redo) only undone.
#[derive(Clone, Debug)]
pub struct ContentEdit {
    kind: ContentEditKind,
    offset: usize,
    text: Vec<char>,
    positions: Vec<UndoPosition>,
    done: bool,
}

impl ContentEdit {
    fn new(kind: ContentEditKind, offset: usize, text: Vec<char>) -> Self {
        Self {
            kind,
            offset,
            text,
            positions: Vec::new(),
            done: true,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ContentEditKind {
        self.kind
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of characters inserted or removed.
    #[must_use]
    pub fn length(&self) -> usize {
        self.text.len()
    }

    /// The inserted or removed text.
    #[must_use]
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.done
    }

    /// Revert the edit on `store`.
    ///
    /// An insertion can only be reverted while its text is still in place.
    pub fn undo(&mut self, store: &mut ContentStore) -> Result<()> {
        if !self.done || (self.kind == ContentEditKind::Insert && !self.in_place(store)) {
            return Err(Error::CannotUndo);
        }
        match self.kind {
            ContentEditKind::Insert => self.take_out(store)?,
            ContentEditKind::Remove => self.put_back(store)?,
        }
        self.done = false;
        Ok(())
    }

    /// Re-apply the edit on `store`.
    ///
    /// A removal can only be re-applied while its text is back in place.
    pub fn redo(&mut self, store: &mut ContentStore) -> Result<()> {
        if self.done || (self.kind == ContentEditKind::Remove && !self.in_place(store)) {
            return Err(Error::CannotRedo);
        }
        match self.kind {
            ContentEditKind::Insert => self.put_back(store)?,
            ContentEditKind::Remove => self.take_out(store)?,
        }
        self.done = true;
        Ok(())
    }

    fn in_place(&self, store: &ContentStore) -> bool {
        let end = self.offset.saturating_add(self.text.len());
        end <= store.len() && store.buffer.collect_range(self.offset, end) == self.text
    }

    fn take_out(&mut self, store: &mut ContentStore) -> Result<()> {
        let length = self.text.len();
        store.check_range(self.offset, length)?;
        self.positions = store.capture_positions(self.offset, length);
        store.remove_raw(self.offset, length);
        Ok(())
    }

    fn put_back(&mut self, store: &mut ContentStore) -> Result<()> {
        store.check_offset(self.offset)?;
        store.insert_raw(self.offset, &self.text);
        let positions = std::mem::take(&mut self.positions);
        if !positions.is_empty() {
            store.restore_positions(&positions, self.offset, self.text.len());
        }
        Ok(())
    }
}
