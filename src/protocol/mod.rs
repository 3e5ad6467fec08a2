//! Wire message types.
//!
//! All frames are JSON text.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `ControlMessage` | Client → Server | Heartbeat ping, state request |
//! | `AppMessage` | Client → Server | Chat and playback commands |
//! | `Inbound` | Server → Client | Chat, roster, history, playback |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `outbound` | Outbound frames and client-id tagging |
//! | `inbound` | Structured view of inbound frames |

// ============================================================================
// Submodules
// ============================================================================

/// Structured view of inbound frames.
pub mod inbound;

/// Outbound frames and client-id tagging.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::{ChatLine, Inbound, PlaybackCommand, PlayerState};
pub use outbound::{
    AppMessage, CLIENT_ID_KEY, ControlMessage, PlaylistItem, encode_tagged, now_ms, tag_client_id,
};
