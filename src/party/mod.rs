//! Watch-party collaborators.
//!
//! Room logic layered on a [`Channel`](crate::Channel): chat and roster
//! state, and keeping a local video player in step with the other viewers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `chat` | Participants and chat log |
//! | `playback` | Player synchronization with echo suppression |
//! | `session` | Wires both onto a channel |
//!
//! # Example
//!
//! ```no_run
//! use reconnecting_channel::Channel;
//! use reconnecting_channel::party::{ChatRoom, PlaybackSync, Player, WatchParty};
//!
//! # fn example<P: Player + Send + 'static>(player: P) -> reconnecting_channel::Result<()> {
//! let channel = Channel::builder("ws://localhost:8000/ws/party/7/").build()?;
//! let party = WatchParty::join(
//!     channel,
//!     PlaybackSync::new(player, false),
//!     ChatRoom::for_user("ann"),
//!     None,
//! );
//!
//! party.say("hello");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Participants and chat log.
pub mod chat;

/// Player synchronization.
pub mod playback;

/// Channel wiring.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use chat::ChatRoom;
pub use playback::{LocalEvent, Moment, PlaybackSync, Player};
pub use session::WatchParty;
