//! `styledoc` - Gap-buffer rich-text document model
//!
//! Character content lives in a gap buffer with positions that follow
//! edits. Above it sit two element trees: a section of paragraphs of
//! styled runs, and a flat list of bidirectional level runs. Every edit
//! produces an undoable record of what it did to all three.
//!
//! # Examples
//!
//! ```
//! use styledoc::{AttributeSet, CharacterFlags, Document, UndoManager};
//!
//! let mut doc = Document::new();
//! let mut history = UndoManager::new();
//!
//! let edit = doc.insert_string(0, "Hello world", &AttributeSet::new()).unwrap();
//! history.add_edit(edit.unwrap());
//! let bold = AttributeSet::new().with_flags(CharacterFlags::BOLD);
//! let edit = doc.set_character_attributes(0, 5, &bold, false).unwrap();
//! history.add_edit(edit.unwrap());
//! assert_eq!(doc.tree().child_count(doc.paragraph_element(0).unwrap()), 2);
//!
//! history.undo(&mut doc).unwrap();
//! assert_eq!(doc.text(), "");
//! ```

// Crate-level lint configuration
#![allow(clippy::module_name_repetitions)] // Allow ElementTree in element etc
#![allow(clippy::missing_errors_doc)] // Every fallible call reports Error
#![allow(clippy::missing_panics_doc)] // Panics only on arena invariants
#![allow(clippy::missing_const_for_fn)] // Many functions could be const, not critical
#![allow(clippy::doc_markdown)] // Allow technical names without backticks
#![allow(clippy::use_self)] // Allow explicit type names in impl blocks
#![allow(clippy::collapsible_if)] // Sometimes nested ifs are clearer
#![allow(clippy::items_after_statements)] // Common pattern in tests
#![allow(clippy::redundant_clone)] // Clones in tests for clarity are fine
#![allow(clippy::too_many_lines)] // Edit script application is long
#![allow(clippy::similar_names)] // start/end pairs like p0/p1
#![allow(clippy::significant_drop_tightening)] // Lock guards scoped to closures

pub mod attributes;
pub mod document;
pub mod element;
pub mod error;
pub mod event;
pub mod text;
pub mod unicode;

// Re-export core types at crate root
pub use attributes::{
    AttributeBuilder, AttributeSet, BIDI_ELEMENT_NAME, BIDI_ROOT_NAME, CONTENT_ELEMENT_NAME,
    CharacterFlags, PARAGRAPH_ELEMENT_NAME, RunDirection, SECTION_ELEMENT_NAME,
};
pub use document::{
    DEFAULT_MAX_HISTORY_DEPTH, Document, DocumentEdit, DocumentOptions, EditEntry, EditKind,
    SharedDocument, UndoManager,
};
pub use error::{Error, Result};
pub use event::{DocumentEvent, ListenerId};

// Re-export structural types
pub use element::{
    AttributeChange, ElementBuffer, ElementChange, ElementId, ElementSpec, ElementTree,
    RetainedElements, SpecDirection, SpecKind,
};

// Re-export storage types
pub use text::{ContentEdit, ContentEditKind, ContentStore, DEFAULT_CAPACITY, GapBuffer, Position, Segment};

// Re-export bidi types
pub use unicode::{BidiResolver, BidiSegmenter, UnicodeBidiResolver, detect_direction, is_complex};
