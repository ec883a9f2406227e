//! Bidirectional text support.
//!
//! - [`BidiResolver`]: pluggable per-character level resolution
//! - [`UnicodeBidiResolver`]: default resolver backed by `unicode-bidi`
//! - [`BidiSegmenter`]: keeps a document's bidi root in step with its text

mod bidi;
mod segmenter;

pub use bidi::{BidiResolver, UnicodeBidiResolver, detect_direction, is_complex};
pub use segmenter::BidiSegmenter;
