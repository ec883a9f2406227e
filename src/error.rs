//! Error types for styledoc.

use std::fmt;

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for document operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Offset or length outside the current content.
    BadLocation { offset: usize, length: usize },
    /// Child index out of range in a branch splice.
    StructuralBounds { index: usize, count: usize },
    /// Edit script that cannot be applied to the current tree.
    InvalidStructure(String),
    /// `undo` called on an edit that is not in the undoable state.
    CannotUndo,
    /// `redo` called on an edit that is not in the redoable state.
    CannotRedo,
    /// Query that has no meaningful answer (e.g. range of an empty branch).
    Precondition(&'static str),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }

    /// Whether the caller can recover by retrying with different arguments.
    #[must_use]
    pub fn is_bad_location(&self) -> bool {
        matches!(self, Self::BadLocation { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLocation { offset, length } => {
                write!(f, "invalid location: offset {offset} (content length {length})")
            }
            Self::StructuralBounds { index, count } => {
                write!(f, "child index {index} out of bounds for {count} children")
            }
            Self::InvalidStructure(msg) => write!(f, "invalid element structure: {msg}"),
            Self::CannotUndo => f.write_str("cannot undo"),
            Self::CannotRedo => f.write_str("cannot redo"),
            Self::Precondition(msg) => write!(f, "precondition violated: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
