//! Edit script instructions consumed by the element buffer.

use crate::attributes::AttributeSet;

/// What an [`ElementSpec`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecKind {
    /// Open a branch.
    StartTag,
    /// Close the current branch.
    EndTag,
    /// A run of text.
    Content,
}

/// How an [`ElementSpec`] relates to the structure around the insertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpecDirection {
    /// Create a fresh element.
    #[default]
    Originate,
    /// Merge into the element before the insertion point.
    JoinPrevious,
    /// Merge into the element after the insertion point.
    JoinNext,
    /// Continue into the right half of the branch split at the insertion
    /// point.
    JoinFracture,
}

/// One instruction of an edit script. Scripts are read strictly left to
/// right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementSpec {
    kind: SpecKind,
    direction: SpecDirection,
    attributes: AttributeSet,
    length: usize,
    text: Option<Vec<char>>,
}

impl ElementSpec {
    /// A content run of `length` characters already in the store.
    #[must_use]
    pub fn content(attributes: AttributeSet, length: usize) -> Self {
        Self {
            kind: SpecKind::Content,
            direction: SpecDirection::Originate,
            attributes,
            length,
            text: None,
        }
    }

    /// A content run carrying its own text.
    #[must_use]
    pub fn content_with_text(attributes: AttributeSet, text: &str) -> Self {
        let text: Vec<char> = text.chars().collect();
        Self {
            kind: SpecKind::Content,
            direction: SpecDirection::Originate,
            attributes,
            length: text.len(),
            text: Some(text),
        }
    }

    #[must_use]
    pub fn start_tag(attributes: AttributeSet) -> Self {
        Self {
            kind: SpecKind::StartTag,
            direction: SpecDirection::Originate,
            attributes,
            length: 0,
            text: None,
        }
    }

    #[must_use]
    pub fn end_tag() -> Self {
        Self {
            kind: SpecKind::EndTag,
            direction: SpecDirection::Originate,
            attributes: AttributeSet::new(),
            length: 0,
            text: None,
        }
    }

    #[must_use]
    pub fn with_direction(mut self, direction: SpecDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn set_direction(&mut self, direction: SpecDirection) {
        self.direction = direction;
    }

    #[must_use]
    pub fn kind(&self) -> SpecKind {
        self.kind
    }

    #[must_use]
    pub fn direction(&self) -> SpecDirection {
        self.direction
    }

    #[must_use]
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Number of characters covered. Zero for tags.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn text(&self) -> Option<&[char]> {
        self.text.as_deref()
    }
}
