//! Bidirectional (BiDi) level resolution.
//!
//! This module wraps the Unicode Bidirectional Algorithm (UAX #9) behind the
//! [`BidiResolver`] trait so documents can swap in another implementation.
//! The default, [`UnicodeBidiResolver`], is backed by `unicode-bidi`.

use unicode_bidi::{BidiClass, BidiInfo, Level};

use crate::attributes::RunDirection;

/// Computes one embedding level per character of a paragraph.
pub trait BidiResolver: Send + Sync {
    /// Resolve levels for `text`.
    ///
    /// `base` forces the paragraph direction; `None` detects it from the
    /// first strong character. The result has exactly `text.len()` entries.
    fn levels(&self, text: &[char], base: Option<RunDirection>) -> Vec<u8>;
}

/// [`BidiResolver`] backed by the `unicode-bidi` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnicodeBidiResolver;

impl BidiResolver for UnicodeBidiResolver {
    fn levels(&self, text: &[char], base: Option<RunDirection>) -> Vec<u8> {
        if text.is_empty() {
            return Vec::new();
        }
        let base = base.or_else(|| detect_direction(text.iter().copied()));
        if base != Some(RunDirection::Rtl) && !text.iter().copied().any(is_complex) {
            return vec![0; text.len()];
        }

        let paragraph: String = text.iter().collect();
        let level = match base {
            Some(RunDirection::Rtl) => Level::rtl(),
            _ => Level::ltr(),
        };
        let bidi = BidiInfo::new(&paragraph, Some(level));

        let mut levels = Vec::with_capacity(text.len());
        for (byte_idx, _) in paragraph.char_indices() {
            // `unicode-bidi` stores one level per byte; the level is repeated for all
            // bytes in a multi-byte code point.
            levels.push(bidi.levels[byte_idx].number());
        }
        levels
    }
}

/// Direction of the first strong character, if any.
#[must_use]
pub fn detect_direction(text: impl IntoIterator<Item = char>) -> Option<RunDirection> {
    for ch in text {
        match unicode_bidi::bidi_class(ch) {
            BidiClass::L => return Some(RunDirection::Ltr),
            BidiClass::R | BidiClass::AL => return Some(RunDirection::Rtl),
            _ => {}
        }
    }
    None
}

/// Whether `ch` can raise an embedding level above zero in a left-to-right
/// paragraph.
#[must_use]
pub fn is_complex(ch: char) -> bool {
    matches!(
        unicode_bidi::bidi_class(ch),
        BidiClass::R
            | BidiClass::AL
            | BidiClass::AN
            | BidiClass::RLE
            | BidiClass::RLO
            | BidiClass::RLI
            | BidiClass::LRE
            | BidiClass::LRO
            | BidiClass::LRI
            | BidiClass::FSI
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    #[test]
    fn levels_empty() {
        assert!(UnicodeBidiResolver.levels(&[], None).is_empty());
    }

    #[test]
    fn levels_pure_ltr_are_zero() {
        let text = chars("Hello, world!");
        let levels = UnicodeBidiResolver.levels(&text, None);
        assert_eq!(levels.len(), text.len());
        assert!(levels.iter().all(|&l| l == 0));
    }

    #[test]
    fn levels_pure_rtl_hebrew_are_one() {
        let text = chars("שלום");
        let levels = UnicodeBidiResolver.levels(&text, None);
        assert_eq!(levels, vec![1; 4]);
    }

    #[test]
    fn levels_mixed_contains_both() {
        let text = chars("Hello שלום");
        let levels = UnicodeBidiResolver.levels(&text, None);
        assert_eq!(levels.len(), text.len());
        assert_eq!(levels[0], 0);
        assert_eq!(levels[text.len() - 1], 1);
    }

    #[test]
    fn levels_forced_rtl_base() {
        let text = chars("abc");
        let levels = UnicodeBidiResolver.levels(&text, Some(RunDirection::Rtl));
        // Latin text inside a right-to-left paragraph sits at level 2.
        assert_eq!(levels, vec![2; 3]);
    }

    #[test]
    fn levels_newline_is_base_level() {
        let text = chars("אב\n");
        let levels = UnicodeBidiResolver.levels(&text, None);
        assert_eq!(levels, vec![1, 1, 1]);
    }

    #[test]
    fn explicit_controls_do_not_panic() {
        // RLO ... PDF
        let text = chars("abc\u{202E}def\u{202C}ghi");
        let levels = UnicodeBidiResolver.levels(&text, None);
        assert_eq!(levels.len(), text.len());
    }

    #[test]
    fn detect_direction_first_strong() {
        assert_eq!(detect_direction("12 abc".chars()), Some(RunDirection::Ltr));
        assert_eq!(detect_direction("12 שלום abc".chars()), Some(RunDirection::Rtl));
        assert_eq!(detect_direction("12345".chars()), None);
    }

    #[test]
    fn complex_characters() {
        assert!(is_complex('ש'));
        assert!(is_complex('\u{0627}'));
        assert!(is_complex('\u{202E}'));
        assert!(!is_complex('a'));
        assert!(!is_complex('1'));
        assert!(!is_complex('\n'));
    }
}
