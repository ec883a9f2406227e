//! Live positions backed by marks into the gap buffer's physical array.
//!
//! A mark stores a *physical* index. Its logical offset is derived from the
//! current gap window, so inserting or removing text far away from a mark
//! costs nothing: only the marks the gap sweeps across are touched.
//!
//! [`Position`] is the external handle. Handles created at the same offset
//! share a mark. The registry keeps one reference to every mark and treats a
//! mark referenced by nobody else as dead; dead marks are dropped in an
//! amortized sweep.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Physical index of a single mark.
#[derive(Debug)]
pub(crate) struct MarkData {
    index: AtomicUsize,
}

impl MarkData {
    fn new(index: usize) -> Self {
        Self {
            index: AtomicUsize::new(index),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Relaxed);
    }
}

/// Gap bounds published by the owning store after every mutation.
///
/// Loads and stores are relaxed; the lock around the owning store orders
/// them for readers on other threads.
#[derive(Debug, Default)]
pub(crate) struct GapWindow {
    start: AtomicUsize,
    end: AtomicUsize,
}

impl GapWindow {
    pub(crate) fn new(start: usize, end: usize) -> Self {
        Self {
            start: AtomicUsize::new(start),
            end: AtomicUsize::new(end),
        }
    }

    pub(crate) fn publish(&self, start: usize, end: usize) {
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
    }

    fn offset_of(&self, index: usize) -> usize {
        let start = self.start.load(Ordering::Relaxed);
        let end = self.end.load(Ordering::Relaxed);
        if index < start {
            index
        } else {
            index.saturating_sub(end - start)
        }
    }
}

/// A logical offset into a document that follows edits made after its
/// creation, including undo and redo.
///
/// Positions are cheap to clone; clones share the same mark.
///
/// An edit updates the gap window and the affected marks one at a time, so
/// an offset read while another thread is editing may mix both states.
/// Read positions of a shared document under its lock, e.g. inside
/// [`SharedDocument::read`](crate::SharedDocument::read).
#[derive(Clone)]
pub struct Position {
    mark: Arc<MarkData>,
    window: Arc<GapWindow>,
}

impl Position {
    /// Current logical offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.window.offset_of(self.mark.index())
    }

    /// Whether both handles are backed by the same mark.
    #[must_use]
    pub fn same_mark(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mark, &other.mark)
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Position")
            .field("offset", &self.offset())
            .field("index", &self.mark.index())
            .finish()
    }
}

/// A mark captured before an edit, with the logical offset it must return
/// to when the edit is reverted.
#[derive(Clone, Debug)]
pub(crate) struct UndoPosition {
    mark: Weak<MarkData>,
    location: usize,
}

/// Sorted collection of every mark handed out by a store.
#[derive(Debug, Default)]
pub(crate) struct MarkRegistry {
    marks: Vec<Arc<MarkData>>,
    allocations: usize,
}

impl MarkRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.marks.len()
    }

    /// First mark that may need adjusting for a change at `index`.
    ///
    /// Marks at physical index 0 never move.
    fn adjust_start(&self, index: usize) -> usize {
        let target = index.max(1);
        self.marks.partition_point(|m| m.index() < target)
    }

    /// Return the mark at `index`, creating and registering one if needed.
    pub(crate) fn mark_at(&mut self, index: usize) -> Arc<MarkData> {
        let sort = self.marks.partition_point(|m| m.index() < index);
        if let Some(existing) = self.marks[sort..]
            .iter()
            .take_while(|m| m.index() == index)
            .next()
        {
            return Arc::clone(existing);
        }

        self.allocations += 1;
        if self.allocations > (self.marks.len() / 10).max(5) {
            self.sweep();
        }
        let sort = self.marks.partition_point(|m| m.index() < index);
        let mark = Arc::new(MarkData::new(index));
        self.marks.insert(sort, Arc::clone(&mark));
        mark
    }

    /// Drop marks that only the registry still references.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.marks.len();
        self.marks.retain(|m| Arc::strong_count(m) > 1);
        self.allocations = 0;
        let removed = before - self.marks.len();
        if removed > 0 {
            tracing::trace!(removed, remaining = self.marks.len(), "swept dead marks");
        }
        removed
    }

    /// The gap moved from `old_start` to `new_start`.
    pub(crate) fn gap_shifted(&self, old_start: usize, old_end: usize, new_start: usize) {
        let gap = old_end - old_start;
        if new_start > old_start {
            let new_end = old_end + (new_start - old_start);
            for mark in &self.marks[self.adjust_start(old_start)..] {
                let index = mark.index();
                if index >= new_end {
                    break;
                }
                mark.set_index(index - gap);
            }
        } else if new_start < old_start {
            for mark in &self.marks[self.adjust_start(new_start)..] {
                let index = mark.index();
                if index >= old_end {
                    break;
                }
                mark.set_index(index + gap);
            }
        }
    }

    /// The array grew and the upper half moved from `old_end` to `new_end`.
    pub(crate) fn end_shifted(&self, old_end: usize, new_end: usize) {
        let delta = new_end - old_end;
        for mark in &self.marks[self.adjust_start(old_end)..] {
            mark.set_index(mark.index() + delta);
        }
    }

    /// Characters in `[new_start, gap_start)` are about to join the gap.
    pub(crate) fn gap_start_lowered(&self, new_start: usize, gap_start: usize, gap_end: usize) {
        for mark in &self.marks[self.adjust_start(new_start)..] {
            if mark.index() > gap_start {
                break;
            }
            mark.set_index(gap_end);
        }
    }

    /// Characters in `[gap_end, new_end)` are about to join the gap.
    pub(crate) fn gap_end_raised(&self, gap_end: usize, new_end: usize) {
        for mark in &self.marks[self.adjust_start(gap_end)..] {
            if mark.index() >= new_end {
                break;
            }
            mark.set_index(new_end);
        }
    }

    /// With the gap at the front, every mark up to the gap end denotes
    /// offset 0 and is parked at physical index 0.
    pub(crate) fn reset_at_zero(&self, gap_start: usize, gap_end: usize) {
        if gap_start != 0 {
            return;
        }
        for mark in &self.marks {
            if mark.index() > gap_end {
                break;
            }
            mark.set_index(0);
        }
    }

    /// Capture the marks whose logical offset lies in
    /// `[offset, offset + length]`.
    pub(crate) fn capture(
        &self,
        window: &GapWindow,
        offset: usize,
        length: usize,
    ) -> Vec<UndoPosition> {
        let end = offset + length;
        let first = self
            .marks
            .partition_point(|m| window.offset_of(m.index()) < offset);
        let last = self
            .marks
            .partition_point(|m| window.offset_of(m.index()) <= end);
        self.marks[first..last.max(first)]
            .iter()
            .map(|m| UndoPosition {
                mark: Arc::downgrade(m),
                location: window.offset_of(m.index()),
            })
            .collect()
    }

    /// Move captured marks back to their recorded offsets after the text
    /// `[offset, offset + length)` was re-inserted with the gap right after it.
    pub(crate) fn restore(
        &mut self,
        positions: &[UndoPosition],
        offset: usize,
        length: usize,
        gap_end: usize,
    ) {
        let end = offset + length;
        let first = if offset == 0 {
            0
        } else {
            self.adjust_start(offset)
        };
        let last = self.adjust_start(gap_end + 1);
        for pos in positions.iter().rev() {
            if let Some(mark) = pos.mark.upgrade() {
                if pos.location == end {
                    mark.set_index(gap_end);
                } else {
                    mark.set_index(pos.location);
                }
            }
        }
        if first < last {
            self.marks[first..last].sort_by_key(|m| m.index());
        }
    }

    #[cfg(test)]
    pub(crate) fn indices(&self) -> Vec<usize> {
        self.marks.iter().map(|m| m.index()).collect()
    }
}

/// Build a position handle for `mark`.
pub(crate) fn position(mark: Arc<MarkData>, window: &Arc<GapWindow>) -> Position {
    Position {
        mark,
        window: Arc::clone(window),
    }
}
