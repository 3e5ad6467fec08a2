//! Channel configuration.
//!
//! Provides a type-safe description of how a [`Channel`](super::Channel)
//! reconnects, probes liveness and buffers outbound frames.
//!
//! # Example
//!
//! ```ignore
//! use reconnecting_channel::ChannelConfig;
//!
//! let config = ChannelConfig::new()
//!     .with_delays(500, 25_000)
//!     .with_jitter(0.25)
//!     .with_heartbeat(20_000, 8_000);
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::ClientId;

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Default first reconnect delay.
pub const DEFAULT_MIN_DELAY_MS: u64 = 500;

/// Default reconnect delay ceiling.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default jitter fraction (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

/// Default period between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 20_000;

/// Default window for inbound traffic after a ping.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Delay between opening and the state request, so the peer can finish
/// registering the connection.
pub const DEFAULT_STATE_REQUEST_DELAY_MS: u64 = 120;

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ============================================================================
// OverflowPolicy
// ============================================================================

/// What the outbound queue does when it is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Discard the frame being queued.
    DropNewest,
    /// Discard the frame being queued and report [`Error::QueueFull`].
    Reject,
}

// ============================================================================
// ChannelConfig
// ============================================================================

/// Reconnect, heartbeat and queueing configuration.
///
/// Immutable once the channel is built. Every field has a default, so a
/// partial JSON object deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Reconnect attempts allowed before the channel stays closed.
    pub max_retries: u32,

    /// Delay before the first reconnect attempt.
    pub min_delay_ms: u64,

    /// Ceiling for the exponential base delay.
    pub max_delay_ms: u64,

    /// Fraction of the base delay used as ± random perturbation (0..=1).
    pub jitter: f64,

    /// Period between heartbeat pings (0 disables the heartbeat).
    pub heartbeat_interval_ms: u64,

    /// How long to wait for inbound traffic after a ping.
    pub heartbeat_timeout_ms: u64,

    /// Master switch for connecting. When `false` the channel never
    /// connects, not even on construction or a manual `connect()`.
    pub auto_reconnect: bool,

    /// Id stamped on tagged outbound frames.
    pub client_id: ClientId,

    /// Ask the peer for its current state after every open.
    pub request_state_on_open: bool,

    /// Delay between open and the state request.
    pub state_request_delay_ms: u64,

    /// Maximum number of frames buffered while disconnected.
    pub queue_capacity: usize,

    /// Behavior of a full outbound queue.
    pub overflow: OverflowPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            auto_reconnect: true,
            client_id: ClientId::generate(),
            request_state_on_open: true,
            state_request_delay_ms: DEFAULT_STATE_REQUEST_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelConfig {
    /// Creates a config with default settings and a fresh client id.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelConfig {
    /// Sets the maximum number of reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the reconnect delay range in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.min_delay_ms = min_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Sets the jitter fraction.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the heartbeat period and liveness timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = 0;
        self
    }

    /// Enables or disables automatic reconnects.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the client id.
    #[inline]
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Enables or disables the state request after open.
    #[inline]
    #[must_use]
    pub fn with_request_state_on_open(mut self, enabled: bool) -> Self {
        self.request_state_on_open = enabled;
        self
    }

    /// Sets the delay between open and the state request.
    #[inline]
    #[must_use]
    pub fn with_state_request_delay(mut self, delay_ms: u64) -> Self {
        self.state_request_delay_ms = delay_ms;
        self
    }

    /// Sets the outbound queue capacity and overflow policy.
    #[inline]
    #[must_use]
    pub fn with_queue(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.queue_capacity = capacity;
        self.overflow = overflow;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ChannelConfig {
    /// Returns the heartbeat period, or `None` when disabled.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Returns the liveness timeout.
    #[inline]
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Returns the delay between open and the state request.
    #[inline]
    #[must_use]
    pub fn state_request_delay(&self) -> Duration {
        Duration::from_millis(self.state_request_delay_ms)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ChannelConfig {
    /// Checks the config invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - `jitter` is not a finite value in `0..=1`
    /// - `min_delay_ms > max_delay_ms`
    /// - the heartbeat is enabled with a zero timeout
    /// - `queue_capacity` is zero
    pub fn validate(&self) -> Result<()> {
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::config(format!(
                "jitter must be within 0..=1, got {}",
                self.jitter
            )));
        }

        if self.min_delay_ms > self.max_delay_ms {
            return Err(Error::config(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        if self.heartbeat_interval_ms > 0 && self.heartbeat_timeout_ms == 0 {
            return Err(Error::config(
                "heartbeat_timeout_ms must be positive when the heartbeat is enabled",
            ));
        }

        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be positive"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
