//! Self-healing message channel.
//!
//! A [`Channel`] keeps one logical connection alive across transport
//! failures: it reconnects with jittered exponential backoff, probes
//! liveness with heartbeat pings, and buffers outbound frames while
//! disconnected.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Channel`] | Public handle |
//! | [`ChannelBuilder`] | Construction and dependency injection |
//! | [`ChannelConfig`] | Reconnect, heartbeat and queue settings |
//! | [`ChannelEvent`] | Events delivered to observers |
//! | [`ConnectionState`] | Link state |
//! | [`EnvironmentSignal`] | Host visibility and reachability hints |
//!
//! # Example
//!
//! ```no_run
//! use reconnecting_channel::{Channel, EnvironmentSignal};
//!
//! # async fn example() -> reconnecting_channel::Result<()> {
//! let channel = Channel::builder("ws://localhost:8000/ws/party/1/").build()?;
//!
//! channel.on_open(|| println!("connected"));
//! channel.on_close(|code, reason| println!("closed: {code} {reason}"));
//!
//! // Host reports that the network came back.
//! channel.signal(EnvironmentSignal::Online);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay computation.
pub mod backoff;

/// Fluent builder for channels.
pub mod builder;

/// Public channel handle.
pub mod core;

mod driver;

mod heartbeat;

mod lifecycle;

/// Observer registry and channel events.
pub mod listeners;

/// Channel configuration.
pub mod options;

mod queue;

/// Connection and retry state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{FixedRandom, RandomSource, SystemRandom};
pub use builder::ChannelBuilder;
pub use self::core::Channel;
pub use listeners::{ChannelEvent, EventKind, Handler};
pub use options::{ChannelConfig, OverflowPolicy};
pub use state::{ConnectionState, EnvironmentSignal, RetryState};
