//! Reconnecting channel - self-healing WebSocket messaging.
//!
//! This library keeps a single logical message channel alive on top of an
//! unreliable WebSocket connection, and ships the watch-party room logic
//! that runs on top of it.
//!
//! # Architecture
//!
//! The channel is a small state machine driven by one background task:
//!
//! - **Handle**: [`Channel`] is cloned freely; every method returns at once
//! - **Driver**: one task per channel owns the timers and link events
//! - **Link**: one WebSocket per connect attempt, owned by its own I/O task
//!
//! Key design principles:
//!
//! - Reconnects use capped exponential backoff with jitter
//! - Heartbeat pings detect half-open connections
//! - Frames sent while disconnected are queued and flushed on open
//! - Stale events from superseded links are dropped
//!
//! # Quick Start
//!
//! ```no_run
//! use reconnecting_channel::{Channel, ChannelConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let channel = Channel::builder("ws://localhost:8000/ws/party/1/")
//!         .config(ChannelConfig::default().with_heartbeat(15_000, 5_000))
//!         .build()?;
//!
//!     channel.on_open(|| println!("connected"));
//!     channel.on_message(|text| println!("received {text}"));
//!
//!     // Queued until the connection opens.
//!     channel.send(r#"{"type":"chat","message":"hello"}"#);
//!
//!     tokio::signal::ctrl_c().await?;
//!     channel.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`Channel`], its builder, config and events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`party`] | Watch-party chat and playback sync |
//! | [`protocol`] | JSON frame types |
//! | [`transport`] | Link abstraction and WebSocket connector |

// ============================================================================
// Modules
// ============================================================================

/// Self-healing channel.
///
/// Use [`Channel::builder()`] to create a configured channel.
pub mod channel;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Watch-party collaborators.
pub mod party;

/// JSON frame types.
pub mod protocol;

/// Link abstraction and WebSocket connector.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{
    Channel, ChannelBuilder, ChannelConfig, ChannelEvent, ConnectionState, EnvironmentSignal,
    EventKind, OverflowPolicy, RetryState,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, LinkId, ListenerId};

// Transport types
pub use transport::{Connector, Link, WsConnector};
