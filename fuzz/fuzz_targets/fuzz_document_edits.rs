//! Fuzz target for document edit sequences.
//!
//! Applies arbitrary inserts, removals and style changes, then checks that
//! both element trees still tile the content and that undoing everything
//! restores the empty document.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use styledoc::{AttributeSet, CharacterFlags, Document, RunDirection};

#[derive(Arbitrary, Debug)]
enum Op {
    Insert { at: u16, text: String, bold: bool },
    Remove { at: u16, len: u8 },
    Style { at: u16, len: u8, bold: bool },
    Direction { at: u16, rtl: bool },
}

const MAX_OPS: usize = 64;

fuzz_target!(|ops: Vec<Op>| {
    let mut doc = Document::new();
    let mut edits = Vec::new();

    for op in ops.into_iter().take(MAX_OPS) {
        let len = doc.len();
        let result = match op {
            Op::Insert { at, text, bold } => {
                let attrs = if bold {
                    AttributeSet::new().with_flags(CharacterFlags::BOLD)
                } else {
                    AttributeSet::new()
                };
                doc.insert_string(usize::from(at) % (len + 1), &text, &attrs)
            }
            Op::Remove { at, len: n } => {
                if len == 0 {
                    continue;
                }
                let at = usize::from(at) % len;
                doc.remove(at, usize::from(n).min(len - at))
            }
            Op::Style { at, len: n, bold } => {
                let at = usize::from(at) % (len + 1);
                let attrs = if bold {
                    AttributeSet::new().with_flags(CharacterFlags::BOLD)
                } else {
                    AttributeSet::new()
                };
                doc.set_character_attributes(at, usize::from(n).min(len + 1 - at), &attrs, true)
            }
            Op::Direction { at, rtl } => {
                let direction = if rtl { RunDirection::Rtl } else { RunDirection::Ltr };
                let attrs = AttributeSet::new().with_run_direction(direction);
                doc.set_paragraph_attributes(usize::from(at) % (len + 1), 0, &attrs, false)
            }
        };
        // Every generated location is in range.
        edits.extend(result.expect("in-range edit failed"));

        doc.tree().check_contiguous(doc.default_root()).expect("paragraph tree broken");
        doc.tree().check_contiguous(doc.bidi_root()).expect("bidi tree broken");
    }

    for edit in edits.iter_mut().rev() {
        doc.undo(edit).expect("undo failed");
    }
    assert!(doc.is_empty());
    assert_eq!(doc.tree().child_count(doc.default_root()), 1);
});
