//! Chat room state.

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::{AppMessage, ChatLine, Inbound};

// ============================================================================
// ChatRoom
// ============================================================================

/// Participants and chat log of one room, rebuilt from inbound frames.
#[derive(Debug, Clone, Default)]
pub struct ChatRoom {
    username: Option<String>,
    participants: Vec<String>,
    log: Vec<ChatLine>,
}

impl ChatRoom {
    /// Creates an empty room for an anonymous viewer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty room for `username`.
    #[must_use]
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Current participants, in server order.
    #[inline]
    #[must_use]
    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Chat lines received so far, oldest first.
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[ChatLine] {
        &self.log
    }

    /// Returns `true` if `line` was written by this viewer.
    #[must_use]
    pub fn is_own(&self, line: &ChatLine) -> bool {
        !line.system && self.username.as_deref() == Some(line.username.as_str())
    }

    /// Applies an inbound frame. Returns `true` if the room changed.
    pub fn apply(&mut self, inbound: &Inbound) -> bool {
        match inbound {
            Inbound::Message(line) => {
                self.log.push(line.clone());
                true
            }
            Inbound::Participants { participants } => {
                self.participants.clone_from(participants);
                true
            }
            Inbound::History { messages } => {
                self.log.extend(messages.iter().cloned());
                !messages.is_empty()
            }
            _ => false,
        }
    }

    /// Builds a chat frame from user input. Returns `None` for blank input.
    #[must_use]
    pub fn compose(text: &str) -> Option<AppMessage> {
        let message = text.trim();
        (!message.is_empty()).then(|| AppMessage::Chat {
            message: message.to_owned(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
