//! Error types for the reconnecting channel.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Construction and configuration return [`Result<T>`]. Runtime failures
//! (send errors, link errors, construction failures of an underlying link)
//! never reach the caller of a public channel method; they are delivered to
//! error observers instead:
//!
//! ```ignore
//! use reconnecting_channel::{Channel, ChannelConfig, Result};
//!
//! fn example() -> Result<()> {
//!     let channel = Channel::new("ws://localhost:8000/ws/room/1/", Vec::new(), ChannelConfig::default())?;
//!     channel.on_error(|err| eprintln!("channel error: {err}"));
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidAddress`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Outbound | [`Error::QueueFull`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`ChannelConfig`](crate::ChannelConfig) fails validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The target address cannot be used to open a link.
    #[error("Invalid address {address:?}: {message}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The underlying link is gone and cannot accept frames.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Outbound Errors
    // ========================================================================
    /// Outbound queue rejected a frame.
    #[error("Outbound queue full ({capacity} frames)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("jitter out of range");
        assert_eq!(err.to_string(), "Configuration error: jitter out of range");
    }

    #[test]
    fn test_invalid_address_display() {
        let err = Error::invalid_address("ftp://x", "unsupported scheme");
        assert_eq!(
            err.to_string(),
            "Invalid address \"ftp://x\": unsupported scheme"
        );
    }

    #[test]
    fn test_queue_full_display() {
        assert_eq!(
            Error::queue_full(8).to_string(),
            "Outbound queue full (8 frames)"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
