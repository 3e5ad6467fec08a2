//! Background task driving a channel.
//!
//! One task per channel. It applies link events in arrival order and fires
//! timer deadlines; it never blocks on a link.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::identifiers::LinkId;
use crate::transport::LinkEvent;

use super::lifecycle::Shared;

// ============================================================================
// Event Loop
// ============================================================================

/// Runs until the channel is closed and its last link has reported closure.
pub(crate) async fn run(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<(LinkId, LinkEvent)>) {
    debug!(address = %shared.address, "Channel driver started");

    loop {
        if shared.is_finished() {
            break;
        }

        let deadline = shared.next_deadline();

        tokio::select! {
            // Events from links
            event = events.recv() => {
                match event {
                    Some((id, event)) => shared.handle_link_event(id, event),
                    None => break,
                }
            }

            // Deadlines changed under the lock
            () = shared.wake.notified() => {}

            // Earliest timer
            () = sleep_until_deadline(deadline) => {
                shared.fire_due(Instant::now());
            }
        }
    }

    debug!(address = %shared.address, "Channel driver terminated");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
