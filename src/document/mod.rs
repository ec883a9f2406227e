//! The styled document and its undo support.

mod edit;
mod history;
mod shared;
mod styled;

pub use edit::{DocumentEdit, EditEntry, EditKind};
pub use history::{DEFAULT_MAX_HISTORY_DEPTH, UndoManager};
pub use shared::SharedDocument;
pub use styled::{Document, DocumentOptions};
