//! Gap buffer storage for document characters.
//!
//! The backing array holds the logical content split around a movable free
//! region:
//!
//! ```text
//!  [ before gap | gap (unused) | after gap ]
//!    0..gap_start  gap_start..gap_end  gap_end..capacity
//! ```
//!
//! This type only moves characters around. Keeping marks in sync with the
//! physical layout is the job of [`ContentStore`](super::ContentStore), which
//! calls the `shift_*` primitives here and adjusts marks alongside.

/// Capacity used by [`GapBuffer::new`].
pub const DEFAULT_CAPACITY: usize = 10;

/// Character array with a single movable gap.
#[derive(Clone, Debug)]
pub struct GapBuffer {
    array: Vec<char>,
    gap_start: usize,
    gap_end: usize,
}

impl Default for GapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GapBuffer {
    /// Create an empty buffer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer whose gap spans `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            array: vec!['\0'; capacity],
            gap_start: 0,
            gap_end: capacity,
        }
    }

    /// Logical length (characters outside the gap).
    #[must_use]
    pub fn len(&self) -> usize {
        self.array.len() - self.gap_len()
    }

    /// Check if there is no logical content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the physical array.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.array.len()
    }

    #[must_use]
    pub fn gap_start(&self) -> usize {
        self.gap_start
    }

    #[must_use]
    pub fn gap_end(&self) -> usize {
        self.gap_end
    }

    /// Number of free slots.
    #[must_use]
    pub fn gap_len(&self) -> usize {
        self.gap_end - self.gap_start
    }

    /// The raw physical array, gap included.
    #[must_use]
    pub fn array(&self) -> &[char] {
        &self.array
    }

    /// Map a logical offset to its physical index.
    ///
    /// Offsets at the gap map past it, so a mark created there moves with
    /// text inserted at the same offset.
    #[must_use]
    pub fn physical_index(&self, offset: usize) -> usize {
        if offset < self.gap_start {
            offset
        } else {
            offset + self.gap_len()
        }
    }

    /// Collect the logical range `[start, end)` into a new vector.
    ///
    /// Callers validate the range.
    #[must_use]
    pub fn collect_range(&self, start: usize, end: usize) -> Vec<char> {
        let mut out = Vec::with_capacity(end - start);
        if end <= self.gap_start {
            out.extend_from_slice(&self.array[start..end]);
        } else if start >= self.gap_start {
            let g = self.gap_len();
            out.extend_from_slice(&self.array[start + g..end + g]);
        } else {
            out.extend_from_slice(&self.array[start..self.gap_start]);
            let rest = end - self.gap_start;
            out.extend_from_slice(&self.array[self.gap_end..self.gap_end + rest]);
        }
        out
    }

    /// Array size to grow to when at least `required` slots are needed.
    ///
    /// Doubles while that is enough, otherwise jumps to twice the request.
    #[must_use]
    pub fn grown_capacity(&self, required: usize) -> usize {
        let doubled = self.array.len().saturating_mul(2);
        if required < doubled {
            doubled
        } else {
            required.saturating_mul(2)
        }
    }

    /// Move the gap so it starts at logical offset `new_gap_start`.
    pub(crate) fn shift_gap(&mut self, new_gap_start: usize) {
        if new_gap_start == self.gap_start {
            return;
        }
        let gap = self.gap_len();
        if new_gap_start < self.gap_start {
            let moved = self.gap_start - new_gap_start;
            self.array
                .copy_within(new_gap_start..self.gap_start, self.gap_end - moved);
        } else {
            let moved = new_gap_start - self.gap_start;
            self.array
                .copy_within(self.gap_end..self.gap_end + moved, self.gap_start);
        }
        self.gap_start = new_gap_start;
        self.gap_end = new_gap_start + gap;
    }

    /// Grow the array to fit `required` slots, keeping the gap position.
    ///
    /// Returns the new gap end.
    pub(crate) fn shift_end(&mut self, required: usize) -> usize {
        let old_len = self.array.len();
        let upper = old_len - self.gap_end;
        let new_len = self.grown_capacity(required);
        let new_gap_end = new_len - upper;
        self.array.resize(new_len, '\0');
        if upper != 0 {
            self.array.copy_within(self.gap_end..old_len, new_gap_end);
        }
        self.gap_end = new_gap_end;
        new_gap_end
    }

    /// Widen the gap downward, discarding characters in
    /// `[new_gap_start, gap_start)`.
    pub(crate) fn shift_gap_start_down(&mut self, new_gap_start: usize) {
        self.gap_start = new_gap_start;
    }

    /// Widen the gap upward, discarding characters in
    /// `[gap_end, new_gap_end)`.
    pub(crate) fn shift_gap_end_up(&mut self, new_gap_end: usize) {
        self.gap_end = new_gap_end;
    }

    /// Copy `text` into the front of the gap. The gap must be large enough.
    pub(crate) fn fill_gap(&mut self, text: &[char]) {
        let end = self.gap_start + text.len();
        self.array[self.gap_start..end].copy_from_slice(text);
        self.gap_start = end;
    }
}

impl std::fmt::Display for GapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;
        for &ch in self.array[..self.gap_start]
            .iter()
            .chain(&self.array[self.gap_end..])
        {
            f.write_char(ch)?;
        }
        Ok(())
    }
}
