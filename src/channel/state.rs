//! Connection and retry state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the channel's underlying link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A link is being established.
    Connecting,
    /// The link is open; frames are transmitted directly.
    Open,
    /// The link was asked to close and its close event is pending.
    Closing,
    /// No link.
    #[default]
    Closed,
}

impl ConnectionState {
    /// Returns `true` when a link handle exists.
    #[inline]
    #[must_use]
    pub const fn has_link(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// RetryState
// ============================================================================

/// Reconnect bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Reconnects scheduled since the last successful open.
    pub attempt_count: u32,
    /// Set by `close()`; no automatic transition happens afterwards.
    pub forced_close: bool,
}

impl RetryState {
    /// Returns `true` once `max_retries` attempts have been scheduled.
    #[inline]
    #[must_use]
    pub const fn exhausted(&self, max_retries: u32) -> bool {
        self.attempt_count >= max_retries
    }
}

// ============================================================================
// EnvironmentSignal
// ============================================================================

/// Host environment hint that may nudge a reconnect.
///
/// Hosts forward these from whatever they observe: page visibility, network
/// reachability, OS resume notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentSignal {
    /// The page or app became visible.
    Visible,
    /// The page or app was hidden.
    Hidden,
    /// Network connectivity returned.
    Online,
    /// Network connectivity was lost.
    Offline,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert!(!ConnectionState::Closed.has_link());
        assert!(ConnectionState::Closing.has_link());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }

    #[test]
    fn test_exhausted() {
        let retry = RetryState {
            attempt_count: 3,
            forced_close: false,
        };
        assert!(retry.exhausted(3));
        assert!(!retry.exhausted(4));
        assert!(RetryState::default().exhausted(0));
    }
}
