//! Document edit performance benchmarks.

#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use styledoc::{AttributeSet, CharacterFlags, Document, UndoManager};

fn sample_document(paragraphs: usize) -> Document {
    let mut doc = Document::new();
    let text = "The quick brown fox jumps over the lazy dog.\n".repeat(paragraphs);
    doc.insert_string(0, &text, &AttributeSet::new()).unwrap();
    doc
}

fn typing(c: &mut Criterion) {
    c.bench_function("document_type_char", |b| {
        let mut doc = Document::new();
        let attrs = AttributeSet::new();
        b.iter(|| {
            let end = doc.len();
            doc.insert_string(end, black_box("x"), &attrs).unwrap();
        });
    });

    c.bench_function("document_type_newline_1k_paragraphs", |b| {
        let mut doc = sample_document(1_000);
        let attrs = AttributeSet::new();
        b.iter(|| {
            let mut edit = doc.insert_string(black_box(500), "\n", &attrs).unwrap().unwrap();
            doc.undo(&mut edit).unwrap();
        });
    });

    c.bench_function("document_type_hebrew", |b| {
        let mut doc = sample_document(100);
        let attrs = AttributeSet::new();
        b.iter(|| {
            let mut edit = doc.insert_string(black_box(10), "שלום", &attrs).unwrap().unwrap();
            doc.undo(&mut edit).unwrap();
        });
    });
}

fn styling(c: &mut Criterion) {
    let bold = AttributeSet::new().with_flags(CharacterFlags::BOLD);
    let plain = AttributeSet::new();

    c.bench_function("document_bold_unbold", |b| {
        let mut doc = sample_document(100);
        b.iter(|| {
            doc.set_character_attributes(black_box(100), 300, &bold, false)
                .unwrap();
            doc.set_character_attributes(black_box(100), 300, &plain, true)
                .unwrap();
        });
    });
}

fn history(c: &mut Criterion) {
    c.bench_function("document_undo_redo_paste", |b| {
        let mut doc = Document::new();
        let mut history = UndoManager::new();
        let text = "pasted line\n".repeat(50);
        history.add_edit(doc.insert_string(0, &text, &AttributeSet::new()).unwrap().unwrap());
        b.iter(|| {
            history.undo(&mut doc).unwrap();
            history.redo(&mut doc).unwrap();
        });
    });
}

criterion_group!(benches, typing, styling, history);
criterion_main!(benches);
