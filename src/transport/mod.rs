//! Transport layer.
//!
//! The channel never touches a socket directly. It asks a [`Connector`] for
//! one [`Link`] per connect attempt and consumes the [`LinkEvent`]s the link
//! reports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Channel        │                              │  Peer           │
//! │                 │         WebSocket            │                 │
//! │  WsConnector    │─────────────────────────────►│  ws://…/ws/…    │
//! │  → WsLink       │◄─────────────────────────────│                 │
//! │  → I/O task     │        text frames           │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `link` | Link and connector traits, link events |
//! | `connection` | WebSocket connector and I/O loop |

// ============================================================================
// Submodules
// ============================================================================

/// Link and connector traits.
pub mod link;

/// WebSocket connector and I/O loop.
pub mod connection;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{WsConnector, WsLink};
pub use link::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Link, LinkEvent, LinkEvents};
