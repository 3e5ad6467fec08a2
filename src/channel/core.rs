//! Public channel handle.
//!
//! # Example
//!
//! ```no_run
//! use reconnecting_channel::{Channel, ChannelConfig};
//!
//! # async fn example() -> reconnecting_channel::Result<()> {
//! let channel = Channel::builder("wss://example.com/ws/party/42/")
//!     .config(ChannelConfig::default().with_max_retries(10))
//!     .build()?;
//!
//! channel.on_message(|text| println!("received {text}"));
//! channel.send(r#"{"type":"chat","message":"hi"}"#);
//!
//! channel.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ListenerId};
use crate::transport::CLOSE_NORMAL;

use super::builder::ChannelBuilder;
use super::lifecycle::Shared;
use super::listeners::{ChannelEvent, EventKind};
use super::options::ChannelConfig;
use super::state::{ConnectionState, EnvironmentSignal, RetryState};

// ============================================================================
// Owner
// ============================================================================

/// Closes the channel when the last handle is dropped.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        self.0.close(CLOSE_NORMAL, "");
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Self-healing message channel.
///
/// Cheap to clone; all clones drive the same connection. The channel is
/// closed when [`close`](Self::close) is called or the last clone is dropped.
///
/// No method blocks or returns a connection error. Failures are reported to
/// `error` observers and recovered from by reconnecting.
#[derive(Clone)]
pub struct Channel {
    owner: Arc<Owner>,
}

// ============================================================================
// Channel - Display
// ============================================================================

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.shared().address)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Channel - Construction
// ============================================================================

impl Channel {
    /// Creates a builder for a channel to `address`.
    #[inline]
    #[must_use]
    pub fn builder(address: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(address)
    }

    /// Creates a channel with the default connector and starts connecting.
    ///
    /// Shorthand for the builder with `protocols` and `config` applied.
    pub fn new<I, S>(address: impl Into<String>, protocols: I, config: ChannelConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChannelBuilder::new(address)
            .protocols(protocols)
            .config(config)
            .build()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self {
            owner: Arc::new(Owner(shared)),
        }
    }

    #[inline]
    fn shared(&self) -> &Shared {
        &self.owner.0
    }
}

// ============================================================================
// Channel - Accessors
// ============================================================================

impl Channel {
    /// Returns the remote address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.shared().address
    }

    /// Returns the configuration the channel was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.shared().config
    }

    /// Returns the id stamped on tagged frames.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.shared().config.client_id
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared().state()
    }

    /// Returns `true` while the link is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the reconnect bookkeeping.
    #[must_use]
    pub fn retry_state(&self) -> RetryState {
        self.shared().retry()
    }

    /// Returns reconnects scheduled since the last successful open.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.retry_state().attempt_count
    }

    /// Returns the number of frames waiting for an open link.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared().queued()
    }
}

// ============================================================================
// Channel - Operations
// ============================================================================

impl Channel {
    /// Sends a text frame, or queues it until the link opens.
    ///
    /// Returns `true` only if the frame was handed to an open link. After
    /// [`close`](Self::close) frames are dropped.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.shared().send(frame.into())
    }

    /// Serializes `payload` and sends it with this channel's `client_id`
    /// injected into keyed objects that lack one.
    ///
    /// Serialization failures are reported to `error` observers.
    pub fn send_tagged<T>(&self, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.shared().send_tagged(payload)
    }

    /// Connects now if no link exists, restarting the retry counter.
    ///
    /// No-op while connecting, open or closing, when `auto_reconnect` is
    /// disabled, and after [`close`](Self::close).
    pub fn connect(&self) {
        self.shared().connect();
    }

    /// Closes the channel for good with a normal close code.
    pub fn close(&self) {
        self.close_with(CLOSE_NORMAL, "");
    }

    /// Closes the channel for good.
    ///
    /// Cancels pending timers, stops reacting to environment signals and
    /// closes the current link. The `close` observers fire once the link
    /// reports closure. Idempotent.
    pub fn close_with(&self, code: u16, reason: &str) {
        self.shared().close(code, reason);
    }

    /// Forwards a host environment hint.
    ///
    /// `Online` and `Visible` reconnect immediately when no link exists;
    /// `Offline` defers due reconnects until `Online`.
    pub fn signal(&self, signal: EnvironmentSignal) {
        self.shared().signal(signal);
    }
}

// ============================================================================
// Channel - Observers
// ============================================================================

impl Channel {
    /// Registers an observer for one event kind.
    ///
    /// Observers run on the thread that produced the event, after the
    /// channel's lock is released, in registration order.
    pub fn add_listener<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.shared().listeners.add(kind, Arc::new(handler))
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared().listeners.remove(id)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, kind: EventKind) -> usize {
        self.shared().listeners.count(kind)
    }

    /// Observes successful opens.
    pub fn on_open<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_listener(EventKind::Open, move |_| handler())
    }

    /// Observes link closures with their code and reason.
    pub fn on_close<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(u16, &str) + Send + Sync + 'static,
    {
        self.add_listener(EventKind::Close, move |event| {
            if let ChannelEvent::Close { code, reason } = event {
                handler(*code, reason.as_str());
            }
        })
    }

    /// Observes inbound text frames.
    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.add_listener(EventKind::Message, move |event| {
            if let ChannelEvent::Message(text) = event {
                handler(text.as_str());
            }
        })
    }

    /// Observes transport and send errors.
    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.add_listener(EventKind::Error, move |event| {
            if let ChannelEvent::Error(err) = event {
                handler(err.as_ref());
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
