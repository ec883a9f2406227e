//! Thread-safe document handle.

use std::sync::{Arc, PoisonError, RwLock};

use crate::document::styled::Document;

/// A [`Document`] shared between threads.
///
/// Readers run concurrently; an edit holds the write lock for its whole
/// duration, so listeners observe a consistent document. A panic while
/// holding the lock does not make the document unusable.
#[derive(Clone, Debug, Default)]
pub struct SharedDocument {
    inner: Arc<RwLock<Document>>,
}

impl SharedDocument {
    #[must_use]
    pub fn new(doc: Document) -> Self {
        Self {
            inner: Arc::new(RwLock::new(doc)),
        }
    }

    /// Run `f` with shared access.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl From<Document> for SharedDocument {
    fn from(doc: Document) -> Self {
        Self::new(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeSet;
    use std::thread;

    #[test]
    fn test_concurrent_appends() {
        let shared = SharedDocument::default();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        shared.write(|doc| {
                            let end = doc.len();
                            doc.insert_string(end, "x", &AttributeSet::new()).unwrap();
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.read(Document::len), 40);
        shared.read(|doc| doc.tree().check_contiguous(doc.default_root()).unwrap());
    }
}
