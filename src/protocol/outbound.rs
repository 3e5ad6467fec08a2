//! Outbound frame types and client-id tagging.
//!
//! # Format
//!
//! Control frames sent by the channel itself:
//!
//! ```json
//! { "type": "ping",          "client_id": "…", "ts": 1700000000000 }
//! { "type": "request_state", "client_id": "…", "ts": 1700000000000 }
//! ```
//!
//! Application frames are arbitrary; keyed objects get `client_id` injected
//! by [`encode_tagged`] when they lack one.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_str, to_string, to_value};

use crate::error::Result;
use crate::identifiers::ClientId;

// ============================================================================
// Constants
// ============================================================================

/// Key carrying the sender id.
pub const CLIENT_ID_KEY: &str = "client_id";

// ============================================================================
// ControlMessage
// ============================================================================

/// Frames generated by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Heartbeat probe.
    Ping {
        /// Sender.
        client_id: ClientId,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
    /// Asks the peer to replay the current shared state.
    RequestState {
        /// Sender.
        client_id: ClientId,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
}

impl ControlMessage {
    /// Creates a ping stamped with the current time.
    #[inline]
    #[must_use]
    pub fn ping(client_id: &ClientId) -> Self {
        Self::Ping {
            client_id: client_id.clone(),
            ts: now_ms(),
        }
    }

    /// Creates a state request stamped with the current time.
    #[inline]
    #[must_use]
    pub fn request_state(client_id: &ClientId) -> Self {
        Self::RequestState {
            client_id: client_id.clone(),
            ts: now_ms(),
        }
    }
}

// ============================================================================
// AppMessage
// ============================================================================

/// Playlist entry selected by a participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Video id, as rendered by the page (string or number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<Value>,
    /// HLS manifest URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    /// Season label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    /// Episode label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Frames sent by the watch-party collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppMessage {
    /// Chat line.
    Chat {
        /// Message body.
        message: String,
    },
    /// Playback started at `time` seconds.
    Play {
        /// Player position in seconds.
        time: f64,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
    /// Playback paused at `time` seconds.
    Pause {
        /// Player position in seconds.
        time: f64,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
    /// Local seek to `time` seconds.
    Seek {
        /// Player position in seconds.
        time: f64,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
    /// Periodic host position for drift correction.
    Keyframe {
        /// Player position in seconds.
        time: f64,
        /// Epoch milliseconds at send time.
        ts: u64,
    },
    /// Switch every participant to another playlist entry.
    PlaylistSelect {
        /// Epoch milliseconds at send time.
        ts: u64,
        /// The selected entry.
        item: PlaylistItem,
    },
}

// ============================================================================
// Tagging
// ============================================================================

/// Inserts `client_id` into a keyed object when absent or null.
///
/// Non-object values are returned unchanged.
#[must_use]
pub fn tag_client_id(value: Value, client_id: &ClientId) -> Value {
    match value {
        Value::Object(mut map) => {
            insert_missing(&mut map, client_id);
            Value::Object(map)
        }
        other => other,
    }
}

/// Serializes a payload into a text frame, tagging keyed objects.
///
/// A string payload that itself holds a JSON object is tagged and
/// re-serialized; any other string is sent verbatim.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be
/// serialized.
pub fn encode_tagged<T>(payload: &T, client_id: &ClientId) -> Result<String>
where
    T: Serialize + ?Sized,
{
    match to_value(payload)? {
        Value::String(text) => match from_str::<Value>(&text) {
            Ok(Value::Object(mut map)) => {
                insert_missing(&mut map, client_id);
                Ok(to_string(&map)?)
            }
            _ => Ok(text),
        },
        value => Ok(to_string(&tag_client_id(value, client_id))?),
    }
}

fn insert_missing(map: &mut Map<String, Value>, client_id: &ClientId) {
    let present = map.get(CLIENT_ID_KEY).is_some_and(|v| !v.is_null());
    if !present {
        map.insert(
            CLIENT_ID_KEY.to_owned(),
            Value::String(client_id.as_str().to_owned()),
        );
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
