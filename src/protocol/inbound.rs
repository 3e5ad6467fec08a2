//! Inbound frame types.
//!
//! The channel passes frames through as raw text. Collaborators that want
//! structure call [`Inbound::parse`], which drops anything malformed or of an
//! unknown `type`.
//!
//! | `type` | Variant |
//! |--------|---------|
//! | `message` | [`Inbound::Message`] |
//! | `participants` | [`Inbound::Participants`] |
//! | `history` | [`Inbound::History`] |
//! | `player_state` | [`Inbound::PlayerState`] |
//! | `playlist_change` | [`Inbound::PlaylistChange`] |
//! | `play` / `pause` / `seek` / `keyframe` | [`Inbound::Play`] … [`Inbound::Keyframe`] |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, from_str};
use tracing::trace;

use super::outbound::PlaylistItem;

// ============================================================================
// Payloads
// ============================================================================

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatLine {
    /// Author name.
    pub username: String,
    /// Message body.
    pub message: String,
    /// `true` for server-generated notices.
    #[serde(default)]
    pub system: bool,
    /// Server timestamp, when present.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Playback command relayed from another participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PlaybackCommand {
    /// Sender's player position in seconds.
    #[serde(default)]
    pub time: Option<f64>,
    /// Sender's epoch milliseconds at send time.
    #[serde(default)]
    pub ts: Option<u64>,
}

/// Full room state replayed in answer to `request_state`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlayerState {
    /// Position in seconds at `ts`.
    #[serde(default)]
    pub time: Option<f64>,
    /// Epoch milliseconds the state was captured at.
    #[serde(default)]
    pub ts: Option<u64>,
    /// Whether the room is playing.
    #[serde(default)]
    pub is_playing: bool,
    /// Current HLS manifest.
    #[serde(default)]
    pub hls_url: Option<String>,
    /// Current video id.
    #[serde(default)]
    pub video_id: Option<Value>,
}

// ============================================================================
// Inbound
// ============================================================================

/// Structured inbound frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// New chat line.
    Message(ChatLine),
    /// Current participant names.
    Participants {
        /// Usernames, in server order.
        participants: Vec<String>,
    },
    /// Recent chat lines, oldest first.
    History {
        /// The lines.
        messages: Vec<ChatLine>,
    },
    /// Room playback state.
    PlayerState {
        /// The state.
        state: PlayerState,
    },
    /// Another participant switched the playlist entry.
    PlaylistChange {
        /// The new entry.
        #[serde(default)]
        item: PlaylistItem,
    },
    /// Remote play.
    Play(PlaybackCommand),
    /// Remote pause.
    Pause(PlaybackCommand),
    /// Remote seek.
    Seek(PlaybackCommand),
    /// Host drift-correction position.
    Keyframe(PlaybackCommand),
}

impl Inbound {
    /// Parses a raw frame. Returns `None` for non-JSON, missing or unknown
    /// `type`, or a payload that does not match its type.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match from_str(text) {
            Ok(inbound) => Some(inbound),
            Err(e) => {
                trace!(error = %e, "Dropping unstructured frame");
                None
            }
        }
    }

    /// Returns the playback command carried by `play`/`pause`/`seek`/`keyframe`.
    #[inline]
    #[must_use]
    pub fn playback(&self) -> Option<&PlaybackCommand> {
        match self {
            Self::Play(cmd) | Self::Pause(cmd) | Self::Seek(cmd) | Self::Keyframe(cmd) => Some(cmd),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
