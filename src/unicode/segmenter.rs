//! Directional run segmentation.
//!
//! The bidi root is a flat branch whose leaves tile the whole content, each
//! carrying one embedding level. After an edit, [`BidiSegmenter`] re-levels
//! the paragraphs the edit touched and splices the bidi root so its leaves
//! again match the resolved levels.

use tracing::{debug, trace};

use crate::attributes::{AttributeSet, RunDirection};
use crate::element::{ElementChange, ElementId, ElementTree};
use crate::error::{Error, Result};
use crate::text::{ContentStore, Segment};
use crate::unicode::BidiResolver;

/// A run of equal level: `[start, end)` at `level`.
type Span = (usize, usize, u8);

/// Recomputes the bidi root for a range of paragraphs.
pub struct BidiSegmenter<'a> {
    tree: &'a mut ElementTree,
    content: &'a mut ContentStore,
    root: ElementId,
    bidi_root: ElementId,
    resolver: &'a dyn BidiResolver,
    run_direction: Option<RunDirection>,
}

impl<'a> BidiSegmenter<'a> {
    /// `root` holds the paragraphs, `bidi_root` the level runs.
    pub fn new(
        tree: &'a mut ElementTree,
        content: &'a mut ContentStore,
        root: ElementId,
        bidi_root: ElementId,
        resolver: &'a dyn BidiResolver,
    ) -> Self {
        Self {
            tree,
            content,
            root,
            bidi_root,
            resolver,
            run_direction: None,
        }
    }

    /// Direction used for paragraphs without a direction of their own.
    #[must_use]
    pub fn with_run_direction(mut self, direction: Option<RunDirection>) -> Self {
        self.run_direction = direction;
        self
    }

    /// Re-level after an insertion or attribute change of
    /// `[offset, offset + length)`: every paragraph from the one containing
    /// `offset` to the one containing the end.
    pub fn update_range(&mut self, offset: usize, length: usize) -> Result<Option<ElementChange>> {
        let first = self.tree.paragraph_at(self.root, offset)?;
        let last = self.tree.paragraph_at(self.root, offset + length)?;
        let start = self.tree.start_offset(first)?;
        let end = self.tree.end_offset(last)?;
        self.relevel(start, end)
    }

    /// Re-level after a removal at `offset`: the paragraph now containing it.
    pub fn update_paragraph(&mut self, offset: usize) -> Result<Option<ElementChange>> {
        let paragraph = self.tree.paragraph_at(self.root, offset)?;
        let start = self.tree.start_offset(paragraph)?;
        let end = self.tree.end_offset(paragraph)?;
        self.relevel(start, end)
    }

    /// Re-level the paragraphs covering `[first_start, last_end)`, which
    /// must start and end on paragraph boundaries.
    ///
    /// Returns `None` when the bidi root already matches.
    pub fn relevel(&mut self, first_start: usize, last_end: usize) -> Result<Option<ElementChange>> {
        let levels = self.levels(first_start, last_end)?;
        let (Some(&level_first), Some(&level_last)) = (levels.first(), levels.last()) else {
            return Ok(None);
        };
        let bidi_root = self.bidi_root;
        let count = self.tree.child_count(bidi_root);
        let doc_len = self.content.len().saturating_sub(1);
        let mut spans: Vec<Span> = Vec::new();

        // Extend the first span into the previous run when the levels match,
        // otherwise cut the previous run at the range start.
        let mut first_span_start = first_start;
        let mut remove_from: isize = 0;
        if first_start > 0 && count > 0 {
            let prev_index = self.tree.element_index(bidi_root, first_start - 1);
            remove_from = to_isize(prev_index);
            let prev = self.tree.child(bidi_root, prev_index)?;
            let prev_level = self.level_of(prev);
            let (prev_start, prev_end) = (self.tree.start_offset(prev)?, self.tree.end_offset(prev)?);
            if prev_level == level_first {
                first_span_start = prev_start;
            } else if prev_end > first_start {
                spans.push((prev_start, first_start, prev_level));
            } else {
                remove_from += 1;
            }
        }

        let first_span_end = levels.iter().take_while(|&&l| l == level_first).count();

        // Likewise at the end with the following run.
        let mut last_span_end = last_end;
        let mut next_span: Option<Span> = None;
        let mut remove_to = to_isize(count) - 1;
        if last_end <= doc_len && count > 0 {
            let next_index = self.tree.element_index(bidi_root, last_end);
            remove_to = to_isize(next_index);
            let next = self.tree.child(bidi_root, next_index)?;
            let next_level = self.level_of(next);
            let (next_start, next_end) = (self.tree.start_offset(next)?, self.tree.end_offset(next)?);
            if next_level == level_last {
                last_span_end = next_end;
            } else if next_start < last_end {
                next_span = Some((last_end, next_end, next_level));
            } else {
                remove_to -= 1;
            }
        }

        let mut last_span_start = levels.len();
        while last_span_start > first_span_end && levels[last_span_start - 1] == level_last {
            last_span_start -= 1;
        }

        if first_span_end == last_span_start && level_first == level_last {
            spans.push((first_span_start, last_span_end, level_first));
        } else {
            spans.push((first_span_start, first_start + first_span_end, level_first));
            let mut i = first_span_end;
            while i < last_span_start {
                let level = levels[i];
                let run = levels[i..].iter().take_while(|&&l| l == level).count();
                spans.push((first_start + i, first_start + i + run, level));
                i += run;
            }
            spans.push((first_start + last_span_start, last_span_end, level_last));
        }
        spans.extend(next_span);

        let remove_from = usize::try_from(remove_from).unwrap_or(0);
        let removed_count = if count > 0 {
            usize::try_from(remove_to - to_isize(remove_from) + 1).unwrap_or(0)
        } else {
            0
        };
        let removed: Vec<ElementId> = self
            .tree
            .children(bidi_root)
            .iter()
            .skip(remove_from)
            .take(removed_count)
            .copied()
            .collect();

        if self.matches(&removed, &spans)? {
            trace!(first_start, last_end, "bidi levels unchanged");
            return Ok(None);
        }

        let added: Vec<ElementId> = spans
            .iter()
            .map(|&(start, end, level)| {
                let p0 = self.content.create_position(start);
                let p1 = self.content.create_position(end);
                self.tree
                    .create_leaf(Some(bidi_root), AttributeSet::bidi_run(level), p0, p1)
            })
            .collect();
        let change = ElementChange::new(bidi_root, remove_from, removed, added);
        change.redo(self.tree)?;
        debug!(
            first_start,
            last_end,
            removed = change.children_removed().len(),
            runs = change.children_added().len(),
            "bidi runs updated"
        );
        Ok(Some(change))
    }

    /// Levels for every character of `[first_start, last_end)`, resolved one
    /// paragraph at a time.
    fn levels(&self, first_start: usize, last_end: usize) -> Result<Vec<u8>> {
        let mut levels = Vec::with_capacity(last_end.saturating_sub(first_start));
        let mut offset = first_start;
        while offset < last_end {
            let paragraph = self.tree.paragraph_at(self.root, offset)?;
            let start = self.tree.start_offset(paragraph)?;
            let end = self.tree.end_offset(paragraph)?;
            if end <= offset {
                return Err(Error::invalid("paragraph does not advance"));
            }
            let direction = self
                .tree
                .attributes(paragraph)
                .run_direction()
                .or(self.run_direction);

            let mut segment = Segment::new();
            self.content.get_chars(start, end - start, &mut segment)?;
            let resolved = self.resolver.levels(segment.as_slice(), direction);
            if resolved.len() != segment.count() {
                return Err(Error::invalid(format!(
                    "resolver returned {} levels for {} characters",
                    resolved.len(),
                    segment.count()
                )));
            }
            levels.extend(resolved);
            offset = end;
        }
        if levels.len() != last_end - first_start {
            return Err(Error::invalid("range does not end on a paragraph boundary"));
        }
        Ok(levels)
    }

    fn level_of(&self, run: ElementId) -> u8 {
        self.tree.attributes(run).bidi_level().unwrap_or(0)
    }

    fn matches(&self, existing: &[ElementId], spans: &[Span]) -> Result<bool> {
        if existing.len() != spans.len() {
            return Ok(false);
        }
        for (&run, &(start, end, level)) in existing.iter().zip(spans) {
            if self.tree.start_offset(run)? != start
                || self.tree.end_offset(run)? != end
                || self.level_of(run) != level
            {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn to_isize(value: usize) -> isize {
    isize::try_from(value).unwrap_or(isize::MAX)
}
