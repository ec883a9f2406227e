//! Character storage with live positions.
//!
//! Key types:
//!
//! - [`GapBuffer`]: raw `char` storage with a movable gap
//! - [`ContentStore`]: gap buffer plus position tracking and undoable edits
//! - [`Position`]: an offset that follows later edits
//! - [`Segment`]: borrowed or copied view handed out by
//!   [`ContentStore::get_chars`]
//!
//! # Examples
//!
//! ```
//! use styledoc::{ContentStore, Segment};
//!
//! let mut store = ContentStore::with_capacity(30);
//! store.insert(0, "This is a test string.").unwrap();
//!
//! let mut seg = Segment::new();
//! store.get_chars(0, 5, &mut seg).unwrap();
//! assert_eq!(seg.to_string(), "This ");
//! assert!(seg.is_borrowed());
//! ```

mod content;
mod gap;
mod marks;
mod segment;

pub use content::{ContentEdit, ContentEditKind, ContentStore};
pub use gap::{DEFAULT_CAPACITY, GapBuffer};
pub use marks::Position;
pub use segment::Segment;
