#![allow(dead_code)] // Each test binary uses a different subset
#![allow(clippy::pedantic)] // Test infra prioritizes clarity over pedantry

use std::sync::Once;

use styledoc::{Document, ElementId};
use tracing::Level;

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness once per binary.
pub fn setup_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_test_writer()
            .try_init();
    });
}

/// `[start, end)` of every child of `id`.
pub fn child_ranges(doc: &Document, id: ElementId) -> Vec<(usize, usize)> {
    child_ranges_of(doc, doc.tree().children(id))
}

fn child_ranges_of(doc: &Document, ids: &[ElementId]) -> Vec<(usize, usize)> {
    ids.iter()
        .map(|&c| {
            (
                doc.tree().start_offset(c).unwrap(),
                doc.tree().end_offset(c).unwrap(),
            )
        })
        .collect()
}

/// Branches directly holding content runs, in document order, at any depth.
pub fn leaf_parents(doc: &Document, id: ElementId) -> Vec<ElementId> {
    let tree = doc.tree();
    let children = tree.children(id);
    if children.first().is_some_and(|&c| tree.is_leaf(c)) {
        return vec![id];
    }
    children
        .iter()
        .flat_map(|&c| leaf_parents(doc, c))
        .collect()
}

pub fn paragraph_ranges(doc: &Document) -> Vec<(usize, usize)> {
    child_ranges(doc, doc.default_root())
}

/// Runs of the `index`th paragraph.
pub fn run_ranges(doc: &Document, index: usize) -> Vec<(usize, usize)> {
    let paragraph = doc.tree().child(doc.default_root(), index).unwrap();
    child_ranges(doc, paragraph)
}

/// The bidi level of every character, implied newline included.
pub fn char_levels(doc: &Document) -> Vec<u8> {
    let mut levels = Vec::new();
    for &run in doc.tree().children(doc.bidi_root()) {
        let start = doc.tree().start_offset(run).unwrap();
        let end = doc.tree().end_offset(run).unwrap();
        let level = doc.tree().attributes(run).bidi_level().unwrap();
        levels.extend(std::iter::repeat_n(level, end - start));
    }
    levels
}

/// Check the structural invariants shared by every document state.
pub fn assert_well_formed(doc: &Document) {
    let tree = doc.tree();
    tree.check_contiguous(doc.default_root()).unwrap();
    tree.check_contiguous(doc.bidi_root()).unwrap();
    assert_eq!(tree.start_offset(doc.default_root()).unwrap(), 0);
    assert_eq!(tree.end_offset(doc.default_root()).unwrap(), doc.len() + 1);
    assert_eq!(tree.end_offset(doc.bidi_root()).unwrap(), doc.len() + 1);

    let content = doc.content().text();
    let paragraphs: Vec<ElementId> = leaf_parents(doc, doc.default_root());
    for (start, end) in child_ranges_of(doc, &paragraphs) {
        let paragraph: Vec<char> = content.chars().skip(start).take(end - start).collect();
        assert_eq!(paragraph.last(), Some(&'\n'), "paragraph must end in a newline");
        assert!(
            !paragraph[..paragraph.len() - 1].contains(&'\n'),
            "paragraph must hold exactly one newline"
        );
    }
}
