//! Document change notification.

use std::fmt;

use crate::document::{DocumentEdit, EditKind};
use crate::element::{ElementChange, ElementId};

/// Notification handed to listeners after a document changed.
#[derive(Clone, Copy, Debug)]
pub struct DocumentEvent<'a> {
    kind: EditKind,
    offset: usize,
    length: usize,
    edit: &'a DocumentEdit,
}

impl<'a> DocumentEvent<'a> {
    pub(crate) fn new(kind: EditKind, edit: &'a DocumentEdit) -> Self {
        Self {
            kind,
            offset: edit.offset(),
            length: edit.length(),
            edit,
        }
    }

    /// What happened. On undo this is the inverse of the edit's own kind.
    #[must_use]
    pub fn kind(&self) -> EditKind {
        self.kind
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// The edit that caused the event.
    #[must_use]
    pub fn edit(&self) -> &'a DocumentEdit {
        self.edit
    }

    /// The structural change recorded for `element`, if any.
    #[must_use]
    pub fn change_for(&self, element: ElementId) -> Option<&'a ElementChange> {
        self.edit.change_for(element)
    }
}

/// Handle returned by [`Document::add_listener`](crate::Document::add_listener).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&DocumentEvent<'_>) + Send + Sync + 'static>;

/// Registered listeners, called in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn add<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&DocumentEvent<'_>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn notify(&self, event: &DocumentEvent<'_>) {
        for (_, listener) in &self.entries {
            listener(event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_add_notify_remove() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut listeners = Listeners::default();
        let id = listeners.add(move |event| {
            assert_eq!(event.kind(), EditKind::Remove);
            assert_eq!(event.offset(), 2);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(listeners.len(), 1);

        let edit = DocumentEdit::new(EditKind::Insert, 2, 3);
        listeners.notify(&DocumentEvent::new(EditKind::Remove, &edit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.notify(&DocumentEvent::new(EditKind::Remove, &edit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_ids_are_unique() {
        let mut listeners = Listeners::default();
        let a = listeners.add(|_| {});
        let b = listeners.add(|_| {});
        assert_ne!(a, b);
        assert_eq!(format!("{listeners:?}"), "Listeners { count: 2 }");
    }
}
