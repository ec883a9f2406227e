//! Character views returned by [`ContentStore::get_chars`](super::ContentStore::get_chars).

use std::borrow::Cow;
use std::fmt;

/// A window of characters, either borrowed from the store's internal array
/// or copied out of it.
///
/// `array()[offset()..offset() + count()]` are the requested characters.
/// When the range does not straddle the gap, `array()` is the store's own
/// physical array.
#[derive(Clone, Debug, Default)]
pub struct Segment<'a> {
    array: Cow<'a, [char]>,
    offset: usize,
    count: usize,
    partial_return: bool,
}

impl<'a> Segment<'a> {
    /// Create an empty segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a shortened result instead of a copy when the range straddles
    /// the gap.
    pub fn set_partial_return(&mut self, partial: bool) {
        self.partial_return = partial;
    }

    #[must_use]
    pub fn is_partial_return(&self) -> bool {
        self.partial_return
    }

    /// The backing array.
    #[must_use]
    pub fn array(&self) -> &[char] {
        &self.array
    }

    /// Index of the first character in [`array`](Self::array).
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of characters in the view.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the view points into the store rather than a copy.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.array, Cow::Borrowed(_))
    }

    /// The characters in the view.
    #[must_use]
    pub fn as_slice(&self) -> &[char] {
        &self.array[self.offset..self.offset + self.count]
    }

    pub(crate) fn borrow_from(&mut self, array: &'a [char], offset: usize, count: usize) {
        self.array = Cow::Borrowed(array);
        self.offset = offset;
        self.count = count;
    }

    pub(crate) fn copy_from(&mut self, chars: Vec<char>) {
        self.count = chars.len();
        self.offset = 0;
        self.array = Cow::Owned(chars);
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        for &ch in self.as_slice() {
            f.write_char(ch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_segment() {
        let seg = Segment::new();
        assert_eq!(seg.count(), 0);
        assert!(seg.as_slice().is_empty());
        assert!(!seg.is_partial_return());
    }

    #[test]
    fn test_borrowed_window() {
        let data: Vec<char> = "abcdef".chars().collect();
        let mut seg = Segment::new();
        seg.borrow_from(&data, 2, 3);
        assert!(seg.is_borrowed());
        assert_eq!(seg.to_string(), "cde");
        assert!(std::ptr::eq(seg.array().as_ptr(), data.as_ptr()));
    }

    #[test]
    fn test_copied_window() {
        let mut seg = Segment::new();
        seg.copy_from(vec!['x', 'y']);
        assert!(!seg.is_borrowed());
        assert_eq!(seg.offset(), 0);
        assert_eq!(seg.to_string(), "xy");
    }
}
