//! Outbound frame queue.
//!
//! Buffers serialized frames while the channel is not open. Frames are
//! drained strictly in enqueue order; a frame leaves the queue only once the
//! link has accepted it.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use tracing::warn;

use crate::error::{Error, Result};

use super::options::OverflowPolicy;

// ============================================================================
// OutboundQueue
// ============================================================================

/// Bounded FIFO of pending frames.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<String>,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub(crate) fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity,
            overflow,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Appends a frame at the tail, applying the overflow policy when full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] when the policy is
    /// [`OverflowPolicy::Reject`] and the queue is full.
    pub(crate) fn push(&mut self, frame: String) -> Result<()> {
        if self.frames.len() < self.capacity {
            self.frames.push_back(frame);
            return Ok(());
        }

        match self.overflow {
            OverflowPolicy::DropOldest => {
                self.frames.pop_front();
                self.frames.push_back(frame);
                warn!(capacity = self.capacity, "Outbound queue full, dropped oldest frame");
                Ok(())
            }
            OverflowPolicy::DropNewest => {
                warn!(capacity = self.capacity, "Outbound queue full, dropped newest frame");
                Ok(())
            }
            OverflowPolicy::Reject => Err(Error::queue_full(self.capacity)),
        }
    }

    /// Puts a frame back at the head after a failed transmission.
    ///
    /// The frame keeps its place ahead of everything queued later; if that
    /// overfills the queue, the newest frame is evicted.
    pub(crate) fn requeue(&mut self, frame: String) {
        self.frames.push_front(frame);
        if self.frames.len() > self.capacity {
            self.frames.pop_back();
            warn!(capacity = self.capacity, "Outbound queue full, dropped newest frame");
        }
    }

    /// Returns the frame at the head.
    #[inline]
    pub(crate) fn front(&self) -> Option<&str> {
        self.frames.front().map(String::as_str)
    }

    /// Removes the frame at the head.
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Drains frames in order through `send`, stopping at the first failure.
    ///
    /// Returns the number of frames sent and the failure, if any. The failed
    /// frame stays at the head.
    pub(crate) fn drain_with<F>(&mut self, mut send: F) -> (usize, Option<Error>)
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut sent = 0;

        while let Some(frame) = self.front() {
            if let Err(e) = send(frame) {
                return (sent, Some(e));
            }
            self.pop();
            sent += 1;
        }

        (sent, None)
    }
}

// ============================================================================
// Tests
// ============================================================================
