//! Paragraph and run structure under document edits.

mod common;

use common::{
    assert_well_formed, child_ranges, leaf_parents, paragraph_ranges, run_ranges,
    setup_test_logging,
};
use proptest::prelude::*;
use styledoc::{
    AttributeSet, CharacterFlags, Document, EditKind, ElementSpec, PARAGRAPH_ELEMENT_NAME,
    SpecDirection,
};

fn plain() -> AttributeSet {
    AttributeSet::new()
}

fn bold() -> AttributeSet {
    AttributeSet::new().with_flags(CharacterFlags::BOLD)
}

fn dump(doc: &Document) -> String {
    doc.tree().dump(doc.default_root()).trim_end().to_string()
}

#[test]
fn typing_builds_paragraphs() {
    setup_test_logging();
    let mut doc = Document::new();
    for (i, ch) in "ab\ncd\n\nef".chars().enumerate() {
        doc.insert_string(i, &ch.to_string(), &plain()).unwrap();
        assert_well_formed(&doc);
    }
    assert_eq!(doc.text(), "ab\ncd\n\nef");
    assert_eq!(paragraph_ranges(&doc), vec![(0, 3), (3, 6), (6, 7), (7, 10)]);
}

#[test]
fn styled_insert_snapshot() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "plain text\nsecond", &plain()).unwrap();
    doc.insert_string(6, "bold ", &bold()).unwrap();
    insta::assert_snapshot!(dump(&doc), @r"
    section
      paragraph
        content [0,6)
        content [6,11) flags=BOLD
        content [11,16)
      paragraph
        content [16,23)
    ");
}

#[test]
fn paste_with_newlines_mid_paragraph() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "headtail", &plain()).unwrap();
    let edit = doc.insert_string(4, "-one\ntwo\nthree-", &plain()).unwrap().unwrap();
    assert_eq!(edit.kind(), EditKind::Insert);
    assert_eq!(edit.length(), 15);
    assert_eq!(doc.text(), "head-one\ntwo\nthree-tail");
    assert_eq!(paragraph_ranges(&doc), vec![(0, 9), (9, 13), (13, 24)]);
    assert_eq!(run_ranges(&doc, 2), vec![(13, 24)]);
    assert_well_formed(&doc);
}

#[test]
fn new_paragraphs_inherit_paragraph_attributes() {
    let mut doc = Document::new();
    doc.insert_string(0, "abc", &plain()).unwrap();
    let centered = AttributeSet::new().with("align", "center");
    doc.set_paragraph_attributes(0, 0, &centered, false).unwrap();
    doc.insert_string(1, "\n", &plain()).unwrap();

    for offset in [0, 2] {
        let paragraph = doc.paragraph_element(offset).unwrap();
        assert_eq!(doc.tree().attributes(paragraph).get("align"), Some("center"));
    }
}

#[test]
fn removing_newline_joins_paragraphs() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "one\ntwo\nthree", &plain()).unwrap();
    let edit = doc.remove(3, 1).unwrap().unwrap();
    assert!(edit.change_for(doc.default_root()).is_some());
    assert_eq!(doc.text(), "onetwo\nthree");
    assert_eq!(paragraph_ranges(&doc), vec![(0, 7), (7, 13)]);
    assert_well_formed(&doc);
}

#[test]
fn remove_everything() {
    let mut doc = Document::new();
    doc.insert_string(0, "x\ny\nz", &plain()).unwrap();
    doc.set_character_attributes(0, 5, &bold(), false).unwrap();
    doc.remove(0, doc.len()).unwrap();
    assert!(doc.is_empty());
    assert_eq!(paragraph_ranges(&doc), vec![(0, 1)]);
    assert_well_formed(&doc);
}

#[test]
fn bold_then_unbold_coalesces() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "one two three", &plain()).unwrap();
    doc.set_character_attributes(4, 3, &bold(), false).unwrap();
    insta::assert_snapshot!(dump(&doc), @r"
    section
      paragraph
        content [0,4)
        content [4,7) flags=BOLD
        content [7,14)
    ");

    doc.set_character_attributes(4, 3, &plain(), true).unwrap();
    insta::assert_snapshot!(dump(&doc), @r"
    section
      paragraph
        content [0,14)
    ");
}

#[test]
fn character_attributes_span_paragraphs() {
    let mut doc = Document::new();
    doc.insert_string(0, "ab\ncd", &plain()).unwrap();
    let edit = doc.set_character_attributes(1, 3, &bold(), false).unwrap().unwrap();
    assert_eq!(edit.kind(), EditKind::Change);
    assert_eq!(run_ranges(&doc, 0), vec![(0, 1), (1, 3)]);
    assert_eq!(run_ranges(&doc, 1), vec![(3, 4), (4, 6)]);
    assert_well_formed(&doc);
}

#[test]
fn merging_keeps_existing_flags() {
    let mut doc = Document::new();
    doc.insert_string(0, "abc", &bold()).unwrap();
    let italic = AttributeSet::new().with_flags(CharacterFlags::ITALIC);
    doc.set_character_attributes(0, 3, &italic, false).unwrap();
    let run = doc.character_element(1).unwrap();
    assert_eq!(
        doc.tree().attributes(run).flags(),
        CharacterFlags::BOLD | CharacterFlags::ITALIC
    );
}

#[test]
fn create_from_script() {
    setup_test_logging();
    let mut doc = Document::new();
    let specs = vec![
        ElementSpec::start_tag(AttributeSet::new()),
        ElementSpec::start_tag(AttributeSet::named("heading")),
        ElementSpec::content_with_text(bold(), "Title\n"),
        ElementSpec::end_tag(),
        ElementSpec::start_tag(AttributeSet::named("paragraph")),
        ElementSpec::content_with_text(plain(), "Body "),
        ElementSpec::content_with_text(bold(), "text\n"),
        ElementSpec::end_tag(),
    ];
    let edits = doc.create(&specs).unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(doc.text(), "Title\nBody text");
    insta::assert_snapshot!(dump(&doc), @r"
    section
      heading
        content [0,6) flags=BOLD
      paragraph
        content [6,11)
        content [11,16) flags=BOLD
      paragraph
        content [16,17)
    ");
}

#[test]
fn script_originates_branch_at_paragraph_boundary() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "one\ntwo", &plain()).unwrap();
    let before = dump(&doc);

    let specs = vec![
        ElementSpec::end_tag(),
        ElementSpec::start_tag(AttributeSet::named("heading")),
        ElementSpec::content_with_text(bold(), "Title\n"),
        ElementSpec::end_tag(),
        ElementSpec::start_tag(AttributeSet::new()).with_direction(SpecDirection::JoinNext),
    ];
    let mut edit = doc.insert_specs(4, &specs).unwrap().unwrap();
    assert_eq!(edit.length(), 6);
    assert_eq!(doc.text(), "one\nTitle\ntwo");
    let change = edit.change_for(doc.default_root()).unwrap();
    assert_eq!(change.index(), 1);
    assert_eq!(change.children_added().len(), 1);
    assert_well_formed(&doc);
    let after = dump(&doc);
    insta::assert_snapshot!(after, @r"
    section
      paragraph
        content [0,4)
      heading
        content [4,10) flags=BOLD
      paragraph
        content [10,14)
    ");

    doc.undo(&mut edit).unwrap();
    assert_eq!(doc.text(), "one\ntwo");
    assert_eq!(dump(&doc), before);
    doc.redo(&mut edit).unwrap();
    assert_eq!(dump(&doc), after);
    assert_well_formed(&doc);
}

#[test]
fn script_fractures_mid_paragraph() {
    setup_test_logging();
    let mut doc = Document::new();
    doc.insert_string(0, "abcdef", &plain()).unwrap();
    let before = dump(&doc);

    let specs = vec![
        ElementSpec::content_with_text(plain(), "XY\n").with_direction(SpecDirection::JoinPrevious),
        ElementSpec::end_tag(),
        ElementSpec::start_tag(AttributeSet::named(PARAGRAPH_ELEMENT_NAME))
            .with_direction(SpecDirection::JoinFracture),
    ];
    let mut edit = doc.insert_specs(3, &specs).unwrap().unwrap();
    assert_eq!(doc.text(), "abcXY\ndef");
    assert_eq!(paragraph_ranges(&doc), vec![(0, 6), (6, 10)]);
    assert_eq!(run_ranges(&doc, 0), vec![(0, 6)]);
    assert_eq!(run_ranges(&doc, 1), vec![(6, 10)]);
    assert_well_formed(&doc);
    let after = dump(&doc);

    doc.undo(&mut edit).unwrap();
    assert_eq!(dump(&doc), before);
    doc.redo(&mut edit).unwrap();
    assert_eq!(dump(&doc), after);
}

/// A quote holding two paragraphs, followed by the trailing paragraph.
fn quoted_document() -> Document {
    let mut doc = Document::new();
    let specs = vec![
        ElementSpec::start_tag(AttributeSet::new()),
        ElementSpec::start_tag(AttributeSet::named("quote")),
        ElementSpec::start_tag(AttributeSet::named(PARAGRAPH_ELEMENT_NAME)),
        ElementSpec::content_with_text(plain(), "first\n"),
        ElementSpec::end_tag(),
        ElementSpec::start_tag(AttributeSet::named(PARAGRAPH_ELEMENT_NAME)),
        ElementSpec::content_with_text(plain(), "second\n"),
        ElementSpec::end_tag(),
        ElementSpec::end_tag(),
    ];
    doc.create(&specs).unwrap();
    doc
}

#[test]
fn create_nested_tree() {
    setup_test_logging();
    let doc = quoted_document();
    assert_eq!(doc.text(), "first\nsecond\n");
    assert_well_formed(&doc);
    insta::assert_snapshot!(dump(&doc), @r"
    section
      quote
        paragraph
          content [0,6)
        paragraph
          content [6,13)
      paragraph
        content [13,14)
    ");
}

#[test]
fn typing_inside_nested_branch() {
    setup_test_logging();
    let mut doc = quoted_document();
    let created = dump(&doc);
    let quote = doc.tree().child(doc.default_root(), 0).unwrap();

    let mut split = doc.insert_string(2, "\n", &plain()).unwrap().unwrap();
    assert_well_formed(&doc);
    assert_eq!(child_ranges(&doc, quote), vec![(0, 3), (3, 7), (7, 14)]);
    let mut typed = doc.insert_string(4, "ZZ", &plain()).unwrap().unwrap();
    assert_eq!(doc.text(), "fi\nrZZst\nsecond\n");
    assert_well_formed(&doc);
    insta::assert_snapshot!(dump(&doc), @r"
    section
      quote
        paragraph
          content [0,3)
        paragraph
          content [3,9)
        paragraph
          content [9,16)
      paragraph
        content [16,17)
    ");

    doc.undo(&mut typed).unwrap();
    doc.undo(&mut split).unwrap();
    assert_eq!(dump(&doc), created);
    assert_well_formed(&doc);
}

#[test]
fn typing_after_nested_branch_closes_it() {
    setup_test_logging();
    let mut doc = quoted_document();
    let created = dump(&doc);

    let mut edit = doc.insert_string(13, "tail", &plain()).unwrap().unwrap();
    assert_eq!(doc.text(), "first\nsecond\ntail");
    assert_well_formed(&doc);
    let paragraphs = leaf_parents(&doc, doc.default_root());
    assert_eq!(paragraphs.len(), 3);
    assert_eq!(doc.tree().parent(paragraphs[2]), Some(doc.default_root()));
    assert_eq!(doc.tree().start_offset(paragraphs[2]).unwrap(), 13);
    assert_eq!(child_ranges(&doc, paragraphs[1]), vec![(6, 13)]);

    doc.undo(&mut edit).unwrap();
    assert_eq!(dump(&doc), created);
}

#[derive(Clone, Debug)]
enum Op {
    Insert(usize, String, bool),
    Remove(usize, usize),
    Style(usize, usize, bool),
    Paragraph(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), "[ab\\n]{1,6}", any::<bool>())
            .prop_map(|(at, s, b)| Op::Insert(at, s, b)),
        2 => (any::<usize>(), 1usize..6).prop_map(|(at, n)| Op::Remove(at, n)),
        1 => (any::<usize>(), 1usize..6, any::<bool>()).prop_map(|(at, n, b)| Op::Style(at, n, b)),
        1 => (any::<usize>(), 0usize..6).prop_map(|(at, n)| Op::Paragraph(at, n)),
    ]
}

fn apply(doc: &mut Document, model: &mut String, op: &Op) -> Option<styledoc::DocumentEdit> {
    let len = doc.len();
    match op {
        Op::Insert(at, s, is_bold) => {
            let at = at % (len + 1);
            let attrs = if *is_bold { bold() } else { plain() };
            let byte = model.char_indices().nth(at).map_or(model.len(), |(i, _)| i);
            model.insert_str(byte, s);
            doc.insert_string(at, s, &attrs).unwrap()
        }
        Op::Remove(at, n) => {
            if len == 0 {
                return None;
            }
            let at = at % len;
            let n = (*n).min(len - at);
            let chars: Vec<char> = model.chars().collect();
            *model = chars[..at].iter().chain(&chars[at + n..]).collect();
            doc.remove(at, n).unwrap()
        }
        Op::Style(at, n, is_bold) => {
            let at = at % (len + 1);
            let n = (*n).min(len + 1 - at);
            let attrs = if *is_bold { bold() } else { plain() };
            doc.set_character_attributes(at, n, &attrs, true).unwrap()
        }
        Op::Paragraph(at, n) => {
            let at = at % (len + 1);
            let attrs = AttributeSet::new().with("indent", n.to_string());
            doc.set_paragraph_attributes(at, *n, &attrs, false).unwrap()
        }
    }
}

proptest! {
    /// Any edit sequence leaves one paragraph per newline, and undoing
    /// everything restores the empty document.
    #[test]
    fn edit_sequences_keep_structure(ops in prop::collection::vec(op(), 1..30)) {
        let mut doc = Document::new();
        let mut model = String::new();
        let mut edits = Vec::new();

        for op in &ops {
            edits.extend(apply(&mut doc, &mut model, op));
            prop_assert_eq!(doc.text(), model.clone());
            assert_well_formed(&doc);
            prop_assert_eq!(
                paragraph_ranges(&doc).len(),
                model.matches('\n').count() + 1
            );
        }

        for edit in edits.iter_mut().rev() {
            doc.undo(edit).unwrap();
        }
        prop_assert_eq!(doc.text(), "");
        prop_assert_eq!(paragraph_ranges(&doc), vec![(0, 1)]);
        assert_well_formed(&doc);
    }

    /// Adjacent runs never carry equal attributes after a style change.
    #[test]
    fn styling_leaves_no_equal_neighbours(
        text in "[a-z]{5,20}",
        ranges in prop::collection::vec((0usize..20, 1usize..8, any::<bool>()), 1..10),
    ) {
        let mut doc = Document::new();
        doc.insert_string(0, &text, &plain()).unwrap();
        for (at, n, is_bold) in ranges {
            let len = doc.len();
            let at = at % len;
            let n = n.min(len - at);
            let attrs = if is_bold { bold() } else { plain() };
            doc.set_character_attributes(at, n, &attrs, true).unwrap();

            let paragraph = doc.paragraph_element(0).unwrap();
            let runs = doc.tree().children(paragraph);
            for pair in runs.windows(2) {
                prop_assert_ne!(
                    doc.tree().attributes(pair[0]),
                    doc.tree().attributes(pair[1])
                );
            }
        }
    }
}
