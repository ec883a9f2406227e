//! Attribute sets attached to elements.
//!
//! - [`CharacterFlags`]: bitflags for bold, italic, underline, etc.
//! - [`AttributeSet`]: element name, character flags, bidi level, run
//!   direction and free-form key/value pairs
//! - [`AttributeBuilder`]: fluent builder for attribute sets
//!
//! # Examples
//!
//! ```
//! use styledoc::{AttributeSet, CharacterFlags, RunDirection};
//!
//! let heading = AttributeSet::builder()
//!     .bold()
//!     .attribute("font-family", "serif")
//!     .build();
//!
//! let rtl = AttributeSet::new().with_run_direction(RunDirection::Rtl);
//! let merged = heading.merge(&rtl);
//! assert!(merged.flags().contains(CharacterFlags::BOLD));
//! assert_eq!(merged.run_direction(), Some(RunDirection::Rtl));
//! ```

use std::collections::BTreeMap;

use bitflags::bitflags;

/// Name of the default root element.
pub const SECTION_ELEMENT_NAME: &str = "section";
/// Default name of branch elements.
pub const PARAGRAPH_ELEMENT_NAME: &str = "paragraph";
/// Default name of leaf elements.
pub const CONTENT_ELEMENT_NAME: &str = "content";
/// Name of the bidi root element.
pub const BIDI_ROOT_NAME: &str = "bidi root";
/// Name of the leaves under the bidi root.
pub const BIDI_ELEMENT_NAME: &str = "bidi level";

bitflags! {
    /// Character styling flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct CharacterFlags: u16 {
        const BOLD          = 0x01;
        const ITALIC        = 0x02;
        const UNDERLINE     = 0x04;
        const STRIKETHROUGH = 0x08;
        const SUPERSCRIPT   = 0x10;
        const SUBSCRIPT     = 0x20;
    }
}

/// Explicit base direction of a paragraph or run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunDirection {
    Ltr,
    Rtl,
}

impl RunDirection {
    /// Paragraph embedding level implied by the direction.
    #[must_use]
    pub const fn base_level(self) -> u8 {
        match self {
            Self::Ltr => 0,
            Self::Rtl => 1,
        }
    }
}

/// Attributes of one element.
///
/// Compared by value: two leaves can merge exactly when their attribute sets
/// are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttributeSet {
    name: Option<String>,
    flags: CharacterFlags,
    bidi_level: Option<u8>,
    run_direction: Option<RunDirection>,
    extra: BTreeMap<String, String>,
}

impl AttributeSet {
    /// Empty attribute set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name: None,
            flags: CharacterFlags::empty(),
            bidi_level: None,
            run_direction: None,
            extra: BTreeMap::new(),
        }
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> AttributeBuilder {
        AttributeBuilder::default()
    }

    /// Attribute set carrying only an element name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Attribute set for a bidi run at `level`.
    #[must_use]
    pub fn bidi_run(level: u8) -> Self {
        Self {
            name: Some(BIDI_ELEMENT_NAME.to_string()),
            bidi_level: Some(level),
            ..Self::default()
        }
    }

    /// Explicit element name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn flags(&self) -> CharacterFlags {
        self.flags
    }

    #[must_use]
    pub fn bidi_level(&self) -> Option<u8> {
        self.bidi_level
    }

    #[must_use]
    pub fn run_direction(&self) -> Option<RunDirection> {
        self.run_direction
    }

    /// Look up a free-form attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Check if no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.flags.is_empty()
            && self.bidi_level.is_none()
            && self.run_direction.is_none()
            && self.extra.is_empty()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: CharacterFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn with_bidi_level(mut self, level: u8) -> Self {
        self.bidi_level = Some(level);
        self
    }

    #[must_use]
    pub fn with_run_direction(mut self, direction: RunDirection) -> Self {
        self.run_direction = Some(direction);
        self
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Merge two sets, with `other` taking precedence for set values.
    ///
    /// Flags are combined.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            name: other.name.clone().or_else(|| self.name.clone()),
            flags: self.flags | other.flags,
            bidi_level: other.bidi_level.or(self.bidi_level),
            run_direction: other.run_direction.or(self.run_direction),
            extra,
        }
    }

    /// Replace every value except the element name with those of `other`.
    #[must_use]
    pub fn replaced_by(&self, other: &Self) -> Self {
        Self {
            name: other.name.clone().or_else(|| self.name.clone()),
            ..other.clone()
        }
    }
}

/// Builder for creating attribute sets fluently.
#[derive(Clone, Debug, Default)]
pub struct AttributeBuilder {
    attrs: AttributeSet,
}

impl AttributeBuilder {
    /// Set the element name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.attrs.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn bold(mut self) -> Self {
        self.attrs.flags |= CharacterFlags::BOLD;
        self
    }

    #[must_use]
    pub fn italic(mut self) -> Self {
        self.attrs.flags |= CharacterFlags::ITALIC;
        self
    }

    #[must_use]
    pub fn underline(mut self) -> Self {
        self.attrs.flags |= CharacterFlags::UNDERLINE;
        self
    }

    #[must_use]
    pub fn strikethrough(mut self) -> Self {
        self.attrs.flags |= CharacterFlags::STRIKETHROUGH;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: CharacterFlags) -> Self {
        self.attrs.flags |= flags;
        self
    }

    #[must_use]
    pub fn bidi_level(mut self, level: u8) -> Self {
        self.attrs.bidi_level = Some(level);
        self
    }

    #[must_use]
    pub fn run_direction(mut self, direction: RunDirection) -> Self {
        self.attrs.run_direction = Some(direction);
        self
    }

    /// Set a free-form attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.extra.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> AttributeSet {
        self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let attrs = AttributeSet::new();
        assert!(attrs.is_empty());
        assert_eq!(attrs.name(), None);
        assert_eq!(attrs, AttributeSet::default());
    }

    #[test]
    fn test_builder() {
        let attrs = AttributeSet::builder()
            .bold()
            .italic()
            .bidi_level(2)
            .attribute("size", "12")
            .build();
        assert!(attrs.flags().contains(CharacterFlags::BOLD | CharacterFlags::ITALIC));
        assert_eq!(attrs.bidi_level(), Some(2));
        assert_eq!(attrs.get("size"), Some("12"));
        assert!(!attrs.is_empty());
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = AttributeSet::builder()
            .bold()
            .attribute("size", "10")
            .attribute("family", "mono")
            .build();
        let overlay = AttributeSet::builder()
            .underline()
            .attribute("size", "14")
            .build();
        let merged = base.merge(&overlay);
        assert!(merged.flags().contains(CharacterFlags::BOLD));
        assert!(merged.flags().contains(CharacterFlags::UNDERLINE));
        assert_eq!(merged.get("size"), Some("14"));
        assert_eq!(merged.get("family"), Some("mono"));
    }

    #[test]
    fn test_replaced_by_keeps_name() {
        let para = AttributeSet::named(PARAGRAPH_ELEMENT_NAME).with_flags(CharacterFlags::BOLD);
        let replaced = para.replaced_by(&AttributeSet::new().with_run_direction(RunDirection::Rtl));
        assert_eq!(replaced.name(), Some(PARAGRAPH_ELEMENT_NAME));
        assert!(replaced.flags().is_empty());
        assert_eq!(replaced.run_direction(), Some(RunDirection::Rtl));
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = AttributeSet::builder().bold().build();
        let b = AttributeSet::new().with_flags(CharacterFlags::BOLD);
        assert_eq!(a, b);
        assert_ne!(a, AttributeSet::new());
    }

    #[test]
    fn test_bidi_run() {
        let run = AttributeSet::bidi_run(1);
        assert_eq!(run.name(), Some(BIDI_ELEMENT_NAME));
        assert_eq!(run.bidi_level(), Some(1));
        assert_eq!(RunDirection::Rtl.base_level(), 1);
    }
}
