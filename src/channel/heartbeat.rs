//! Heartbeat deadlines.
//!
//! The monitor is pure bookkeeping: it stores the next ping deadline and the
//! liveness deadline, and the driver task sleeps until the earliest of them.
//! Clearing a deadline is therefore synchronous with the caller holding the
//! channel lock.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// HeartbeatTick
// ============================================================================

/// What a due heartbeat deadline asks the channel to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatTick {
    /// No inbound traffic since the last ping: force the link closed.
    Expired,
    /// Time to send a ping.
    Ping,
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Ping timer plus liveness timer.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    /// Ping period while running.
    interval: Option<Duration>,
    /// Liveness window armed by each ping.
    timeout: Duration,
    /// Next ping.
    ping_at: Option<Instant>,
    /// Liveness expiry, armed while a ping is unanswered.
    liveness_at: Option<Instant>,
}

impl Heartbeat {
    /// Starts the ping timer. Does nothing when `interval` is `None`.
    pub(crate) fn start(&mut self, now: Instant, interval: Option<Duration>, timeout: Duration) {
        self.stop();
        self.interval = interval;
        self.timeout = timeout;
        self.ping_at = interval.map(|period| now + period);
    }

    /// Clears both timers.
    pub(crate) fn stop(&mut self) {
        self.interval = None;
        self.ping_at = None;
        self.liveness_at = None;
    }

    /// Records inbound traffic; disarms the liveness timer.
    pub(crate) fn on_inbound(&mut self) {
        self.liveness_at = None;
    }

    /// Returns `true` while the ping timer is running.
    #[inline]
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.ping_at.is_some()
    }

    /// Returns `true` while a ping is unanswered.
    #[inline]
    #[cfg(test)]
    pub(crate) fn is_awaiting(&self) -> bool {
        self.liveness_at.is_some()
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match (self.ping_at, self.liveness_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Consumes the deadline due at `now`, if any.
    ///
    /// Expiry wins over a ping due at the same instant. A ping re-arms the
    /// ping timer and arms the liveness timer unless it is already armed by
    /// an earlier unanswered ping.
    pub(crate) fn poll(&mut self, now: Instant) -> Option<HeartbeatTick> {
        if self.liveness_at.is_some_and(|at| at <= now) {
            self.liveness_at = None;
            return Some(HeartbeatTick::Expired);
        }

        let period = self.interval?;
        if self.ping_at.is_some_and(|at| at <= now) {
            self.ping_at = Some(now + period);
            self.liveness_at.get_or_insert(now + self.timeout);
            return Some(HeartbeatTick::Ping);
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(20);
    const TIMEOUT: Duration = Duration::from_secs(8);

    fn running(now: Instant) -> Heartbeat {
        let mut hb = Heartbeat::default();
        hb.start(now, Some(INTERVAL), TIMEOUT);
        hb
    }

    #[test]
    fn test_start_schedules_first_ping() {
        let now = Instant::now();
        let hb = running(now);

        assert!(hb.is_running());
        assert!(!hb.is_awaiting());
        assert_eq!(hb.next_deadline(), Some(now + INTERVAL));
    }

    #[test]
    fn test_disabled_heartbeat_has_no_deadline() {
        let now = Instant::now();
        let mut hb = Heartbeat::default();
        hb.start(now, None, TIMEOUT);

        assert!(!hb.is_running());
        assert_eq!(hb.next_deadline(), None);
        assert_eq!(hb.poll(now + INTERVAL * 10), None);
    }

    #[test]
    fn test_not_due_yields_nothing() {
        let now = Instant::now();
        let mut hb = running(now);
        assert_eq!(hb.poll(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_ping_arms_liveness() {
        let now = Instant::now();
        let mut hb = running(now);
        let ping_time = now + INTERVAL;

        assert_eq!(hb.poll(ping_time), Some(HeartbeatTick::Ping));
        assert!(hb.is_awaiting());
        assert_eq!(hb.next_deadline(), Some(ping_time + TIMEOUT));
    }

    #[test]
    fn test_inbound_disarms_liveness() {
        let now = Instant::now();
        let mut hb = running(now);
        let ping_time = now + INTERVAL;

        hb.poll(ping_time);
        hb.on_inbound();

        assert!(!hb.is_awaiting());
        assert_eq!(hb.poll(ping_time + TIMEOUT), None);
        assert_eq!(hb.next_deadline(), Some(ping_time + INTERVAL));
    }

    #[test]
    fn test_silence_expires() {
        let now = Instant::now();
        let mut hb = running(now);
        let ping_time = now + INTERVAL;

        hb.poll(ping_time);
        assert_eq!(hb.poll(ping_time + TIMEOUT), Some(HeartbeatTick::Expired));
        assert!(!hb.is_awaiting());
    }

    #[test]
    fn test_unanswered_ping_keeps_first_deadline() {
        let now = Instant::now();
        let mut hb = Heartbeat::default();
        hb.start(now, Some(Duration::from_secs(5)), Duration::from_secs(12));

        let first = now + Duration::from_secs(5);
        hb.poll(first);
        hb.poll(first + Duration::from_secs(5));

        assert_eq!(
            hb.poll(first + Duration::from_secs(12)),
            Some(HeartbeatTick::Expired)
        );
    }

    #[test]
    fn test_stop_clears_everything() {
        let now = Instant::now();
        let mut hb = running(now);
        hb.poll(now + INTERVAL);
        hb.stop();

        assert_eq!(hb.next_deadline(), None);
        assert!(!hb.is_running());
        assert!(!hb.is_awaiting());
    }
}
