//! Link abstraction between the channel and a concrete transport.
//!
//! A [`Connector`] creates one [`Link`] per connect attempt and returns it
//! immediately; the link reports its lifecycle asynchronously through
//! [`LinkEvents`], the same way a browser WebSocket fires `open`, `message`,
//! `error` and `close`.
//!
//! ```text
//! Channel ──open()──► Connector ──► Box<dyn Link>
//!    ▲                                   │
//!    └──────── LinkEvents (tagged) ◄─────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::LinkId;

// ============================================================================
// Constants
// ============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Closed without a close frame (reserved, never sent on the wire).
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// LinkEvent
// ============================================================================

/// Lifecycle notification emitted by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed; the link accepts frames.
    Open,
    /// Inbound text frame.
    Message(String),
    /// Transport error. A `Closed` event follows if the link is gone.
    Error(String),
    /// The link is closed and will emit nothing further.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

// ============================================================================
// LinkEvents
// ============================================================================

/// Sender half handed to a link, tagging every event with the link's id.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    id: LinkId,
    tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>,
}

impl LinkEvents {
    pub(crate) fn new(id: LinkId, tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>) -> Self {
        Self { id, tx }
    }

    /// Returns the id of the link these events belong to.
    #[inline]
    #[must_use]
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Emits an event. Dropped silently once the channel is gone.
    pub fn emit(&self, event: LinkEvent) {
        let _ = self.tx.send((self.id, event));
    }

    /// Emits [`LinkEvent::Open`].
    #[inline]
    pub fn opened(&self) {
        self.emit(LinkEvent::Open);
    }

    /// Emits [`LinkEvent::Message`].
    #[inline]
    pub fn message(&self, text: impl Into<String>) {
        self.emit(LinkEvent::Message(text.into()));
    }

    /// Emits [`LinkEvent::Error`].
    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.emit(LinkEvent::Error(message.into()));
    }

    /// Emits [`LinkEvent::Closed`].
    #[inline]
    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(LinkEvent::Closed {
            code,
            reason: reason.into(),
        });
    }
}

// ============================================================================
// Link
// ============================================================================

/// Handle to one underlying connection.
pub trait Link: Send + Sync {
    /// Hands a text frame to the transport without waiting for the network.
    ///
    /// # Errors
    ///
    /// Returns an error when the link can no longer accept frames.
    fn send(&self, frame: &str) -> Result<()>;

    /// Starts closing the link. A [`LinkEvent::Closed`] follows.
    fn close(&self, code: u16, reason: &str);
}

// ============================================================================
// Connector
// ============================================================================

/// Factory for links.
pub trait Connector: Send + Sync + 'static {
    /// Starts connecting to `address` and returns the link handle at once.
    ///
    /// # Errors
    ///
    /// Returns an error when the link cannot even be constructed, e.g. for a
    /// malformed address. The channel treats this as an immediate close.
    fn open(&self, address: &str, protocols: &[String], events: LinkEvents) -> Result<Box<dyn Link>>;
}
