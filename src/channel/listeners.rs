//! Observer registry.
//!
//! Observers are registered per [`EventKind`] and invoked in registration
//! order. Dispatch snapshots the handler list and releases the lock before
//! calling, so handlers may register observers or call back into the channel.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Error;
use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Observer callback.
pub type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

// ============================================================================
// EventKind
// ============================================================================

/// Kind of channel event an observer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Link opened.
    Open,
    /// Link closed.
    Close,
    /// Inbound text frame.
    Message,
    /// Link or transmission error.
    Error,
}

// ============================================================================
// ChannelEvent
// ============================================================================

/// Event delivered to observers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The link is open and the queue has been flushed.
    Open,
    /// The link closed.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// Raw inbound text frame, unmodified.
    Message(String),
    /// Non-fatal failure.
    Error(Arc<Error>),
}

impl ChannelEvent {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close { .. } => EventKind::Close,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Creates an error event.
    #[inline]
    pub(crate) fn error(err: Error) -> Self {
        Self::Error(Arc::new(err))
    }
}

// ============================================================================
// Listeners
// ============================================================================

struct Entry {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

/// Registered observers, in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.read().len())
            .finish()
    }
}

impl Listeners {
    /// Registers a handler.
    pub(crate) fn add(&self, kind: EventKind, handler: Handler) -> ListenerId {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        self.entries.write().push(Entry { id, kind, handler });
        id
    }

    /// Unregisters a handler. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Number of handlers for `kind`.
    #[cfg(test)]
    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Invokes every handler registered for the event's kind.
    pub(crate) fn dispatch(&self, event: &ChannelEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    /// Dispatches events in order.
    pub(crate) fn dispatch_all(&self, events: Vec<ChannelEvent>) {
        for event in &events {
            self.dispatch(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |event| log.lock().push(format!("{tag}:{:?}", event.kind())))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        listeners.add(EventKind::Message, recorder(&log, "first"));
        listeners.add(EventKind::Message, recorder(&log, "second"));
        listeners.add(EventKind::Open, recorder(&log, "open"));

        listeners.dispatch(&ChannelEvent::Message("hi".into()));

        assert_eq!(*log.lock(), vec!["first:Message", "second:Message"]);
    }

    #[test]
    fn test_remove_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        let id = listeners.add(EventKind::Open, recorder(&log, "a"));

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.count(EventKind::Open), 0);

        listeners.dispatch(&ChannelEvent::Open);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_handler_may_register_during_dispatch() {
        let listeners = Arc::new(Listeners::default());
        let inner = Arc::clone(&listeners);
        listeners.add(
            EventKind::Open,
            Arc::new(move |_| {
                inner.add(EventKind::Close, Arc::new(|_| {}));
            }),
        );

        listeners.dispatch(&ChannelEvent::Open);
        assert_eq!(listeners.count(EventKind::Close), 1);
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(ChannelEvent::Open.kind(), EventKind::Open);
        assert_eq!(
            ChannelEvent::Close {
                code: 1000,
                reason: String::new()
            }
            .kind(),
            EventKind::Close
        );
        assert_eq!(
            ChannelEvent::error(Error::ConnectionClosed).kind(),
            EventKind::Error
        );
    }
}
