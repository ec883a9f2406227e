//! Structural model: elements over the content.
//!
//! - [`ElementTree`]: arena of branches and leaves addressed by [`ElementId`]
//! - [`ElementSpec`]: one instruction of an edit script
//! - [`ElementBuffer`]: applies scripts, removals and run splits to a tree
//! - [`ElementChange`] / [`AttributeChange`]: undoable records of what an
//!   edit did to the tree

mod buffer;
mod change;
mod spec;
mod tree;

pub use buffer::ElementBuffer;
pub use change::{AttributeChange, ElementChange};
pub use spec::{ElementSpec, SpecDirection, SpecKind};
pub use tree::{ElementId, ElementTree, RetainedElements};
