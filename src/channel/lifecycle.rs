//! Connection lifecycle manager.
//!
//! Owns the single link handle and every piece of mutable channel state.
//! Transitions run under one lock and collect the events they produce; the
//! caller dispatches those events after releasing the lock.
//!
//! # State Machine
//!
//! ```text
//!            connect()                open event
//!  Closed ─────────────► Connecting ─────────────► Open
//!    ▲                       │                       │
//!    │        close event    │    close event /      │
//!    └───────────────────────┴── heartbeat timeout ──┘
//!    │                                    (via Closing)
//!    └── reconnect timer (backoff) ── Connecting …
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::identifiers::LinkId;
use crate::protocol::{ControlMessage, encode_tagged};
use crate::transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Link, LinkEvent, LinkEvents};

use super::backoff::{self, RandomSource};
use super::heartbeat::{Heartbeat, HeartbeatTick};
use super::listeners::{ChannelEvent, Listeners};
use super::options::ChannelConfig;
use super::queue::OutboundQueue;
use super::state::{ConnectionState, EnvironmentSignal, RetryState};

// ============================================================================
// Types
// ============================================================================

/// Events produced by one transition, dispatched after the lock is released.
pub(crate) type Outbox = Vec<ChannelEvent>;

/// Reason sent when the liveness timer forces a link closed.
pub(crate) const HEARTBEAT_TIMEOUT_REASON: &str = "heartbeat timeout";

// ============================================================================
// Inner
// ============================================================================

/// The current link and its generation.
struct ActiveLink {
    id: LinkId,
    handle: Box<dyn Link>,
}

/// Mutable channel state, guarded by [`Shared::inner`].
pub(crate) struct Inner {
    state: ConnectionState,
    link: Option<ActiveLink>,
    last_link_id: LinkId,
    retry: RetryState,
    /// Cleared by `close()`.
    auto_reconnect: bool,
    /// Last reachability reported through environment signals.
    online: bool,
    /// A reconnect came due while offline.
    reconnect_deferred: bool,
    /// Environment signals are honoured until `close()`.
    attached: bool,
    queue: OutboundQueue,
    heartbeat: Heartbeat,
    reconnect_at: Option<Instant>,
    state_request_at: Option<Instant>,
    random: Box<dyn RandomSource>,
}

impl Inner {
    fn new(config: &ChannelConfig, random: Box<dyn RandomSource>) -> Self {
        Self {
            state: ConnectionState::Closed,
            link: None,
            last_link_id: LinkId::new(0),
            retry: RetryState::default(),
            auto_reconnect: config.auto_reconnect,
            online: true,
            reconnect_deferred: false,
            attached: true,
            queue: OutboundQueue::new(config.queue_capacity, config.overflow),
            heartbeat: Heartbeat::default(),
            reconnect_at: None,
            state_request_at: None,
            random,
        }
    }

    fn current_link(&self) -> Option<LinkId> {
        self.link.as_ref().map(|link| link.id)
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconnect_at,
            self.state_request_at,
            self.heartbeat.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the public facade and the driver task.
pub(crate) struct Shared {
    pub(crate) address: String,
    pub(crate) protocols: Vec<String>,
    pub(crate) config: ChannelConfig,
    connector: Box<dyn Connector>,
    events_tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>,
    inner: Mutex<Inner>,
    pub(crate) listeners: Listeners,
    /// Wakes the driver when deadlines change.
    pub(crate) wake: Notify,
}

impl Shared {
    pub(crate) fn new(
        address: String,
        protocols: Vec<String>,
        config: ChannelConfig,
        connector: Box<dyn Connector>,
        random: Box<dyn RandomSource>,
        events_tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>,
    ) -> Self {
        let inner = Inner::new(&config, random);

        Self {
            address,
            protocols,
            config,
            connector,
            events_tx,
            inner: Mutex::new(inner),
            listeners: Listeners::default(),
            wake: Notify::new(),
        }
    }

    /// Runs `transition` under the lock, then wakes the driver and
    /// dispatches the produced events.
    fn transact<R>(&self, transition: impl FnOnce(&Self, &mut Inner, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox::new();
        let result = {
            let mut guard = self.inner.lock();
            transition(self, &mut *guard, &mut outbox)
        };

        self.wake.notify_one();
        self.listeners.dispatch_all(outbox);
        result
    }
}

// ============================================================================
// Shared - Queries
// ============================================================================

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn retry(&self) -> RetryState {
        self.inner.lock().retry
    }

    pub(crate) fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().next_deadline()
    }

    /// The channel was closed and its last link is gone.
    pub(crate) fn is_finished(&self) -> bool {
        let inner = self.inner.lock();
        inner.retry.forced_close && inner.link.is_none()
    }
}

// ============================================================================
// Shared - Public Operations
// ============================================================================

impl Shared {
    /// Manual connect. Restarts the attempt counter. Gated by `auto_reconnect`.
    pub(crate) fn connect(&self) {
        self.transact(|shared, inner, outbox| {
            if inner.retry.forced_close {
                debug!("Channel closed, connect ignored");
                return;
            }
            if !inner.auto_reconnect {
                debug!("Auto-reconnect disabled, connect ignored");
                return;
            }
            if inner.link.is_some() {
                trace!(state = %inner.state, "Connect ignored, link already live");
                return;
            }

            inner.retry.attempt_count = 0;
            inner.reconnect_deferred = false;
            shared.start_link(inner, outbox);
        });
    }

    /// Sends a raw frame. Returns `true` only if the link accepted it.
    pub(crate) fn send(&self, frame: String) -> bool {
        self.transact(|shared, inner, outbox| {
            if inner.retry.forced_close {
                debug!("Channel closed, frame dropped");
                return false;
            }
            shared.transmit(inner, frame, outbox)
        })
    }

    /// Serializes and tags a payload, then sends it.
    pub(crate) fn send_tagged<T>(&self, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        match encode_tagged(payload, &self.config.client_id) {
            Ok(frame) => self.send(frame),
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound payload");
                self.listeners.dispatch(&ChannelEvent::error(e));
                false
            }
        }
    }

    /// Terminal close. Idempotent.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        self.transact(|_, inner, _| {
            if inner.retry.forced_close {
                return;
            }

            inner.retry.forced_close = true;
            inner.auto_reconnect = false;
            inner.attached = false;
            inner.reconnect_deferred = false;
            inner.heartbeat.stop();
            inner.reconnect_at = None;
            inner.state_request_at = None;

            match inner.link.as_ref() {
                Some(link) => {
                    inner.state = ConnectionState::Closing;
                    link.handle.close(code, reason);
                }
                None => inner.state = ConnectionState::Closed,
            }

            info!(code, reason, queued = inner.queue.len(), "Channel closed");
        });
    }

    /// Applies an environment hint.
    pub(crate) fn signal(&self, signal: EnvironmentSignal) {
        self.transact(|shared, inner, outbox| {
            if !inner.attached {
                return;
            }

            match signal {
                EnvironmentSignal::Offline => {
                    inner.online = false;
                    info!("Network offline");
                }
                EnvironmentSignal::Hidden => trace!("Page hidden"),
                EnvironmentSignal::Online => {
                    inner.online = true;
                    shared.nudge(inner, outbox);
                }
                EnvironmentSignal::Visible => shared.nudge(inner, outbox),
            }
        });
    }
}

// ============================================================================
// Shared - Driver Operations
// ============================================================================

impl Shared {
    /// Applies an event reported by a link.
    pub(crate) fn handle_link_event(&self, id: LinkId, event: LinkEvent) {
        self.transact(|shared, inner, outbox| {
            if inner.current_link() != Some(id) {
                trace!(%id, ?event, "Ignoring event from stale link");
                return;
            }

            match event {
                LinkEvent::Open => shared.on_open(inner, outbox),
                LinkEvent::Message(text) => {
                    inner.heartbeat.on_inbound();
                    outbox.push(ChannelEvent::Message(text));
                }
                LinkEvent::Error(message) => {
                    warn!(%id, error = %message, "Link error");
                    outbox.push(ChannelEvent::error(Error::connection(message)));
                }
                LinkEvent::Closed { code, reason } => {
                    info!(%id, code, reason = %reason, "Link closed");
                    shared.on_closed(inner, code, reason, outbox);
                }
            }
        });
    }

    /// Fires every deadline due at `now`.
    pub(crate) fn fire_due(&self, now: Instant) {
        self.transact(|shared, inner, outbox| {
            if inner.reconnect_at.is_some_and(|at| at <= now) {
                inner.reconnect_at = None;
                if inner.retry.forced_close {
                    trace!("Reconnect cancelled by close");
                } else if !inner.online {
                    inner.reconnect_deferred = true;
                    info!("Network offline, reconnect deferred");
                } else {
                    shared.start_link(inner, outbox);
                }
            }

            if inner.state_request_at.is_some_and(|at| at <= now) {
                inner.state_request_at = None;
                if inner.state == ConnectionState::Open {
                    let request = ControlMessage::request_state(&shared.config.client_id);
                    shared.transmit_tagged(inner, &request, outbox);
                }
            }

            while let Some(tick) = inner.heartbeat.poll(now) {
                match tick {
                    HeartbeatTick::Ping => {
                        let ping = ControlMessage::ping(&shared.config.client_id);
                        if !shared.transmit_tagged(inner, &ping, outbox) {
                            warn!("Heartbeat ping not transmitted");
                        }
                    }
                    HeartbeatTick::Expired => {
                        warn!(
                            timeout_ms = shared.config.heartbeat_timeout_ms,
                            "Heartbeat timeout, forcing reconnect"
                        );
                        inner.heartbeat.stop();
                        if let Some(link) = inner.link.as_ref() {
                            inner.state = ConnectionState::Closing;
                            link.handle.close(CLOSE_NORMAL, HEARTBEAT_TIMEOUT_REASON);
                        }
                    }
                }
            }
        });
    }
}

// ============================================================================
// Shared - Transitions
// ============================================================================

impl Shared {
    /// `Closed → Connecting`, or an immediate close if the link cannot be
    /// constructed.
    fn start_link(&self, inner: &mut Inner, outbox: &mut Outbox) {
        if inner.retry.forced_close || inner.link.is_some() {
            return;
        }

        let id = inner.last_link_id.next();
        inner.last_link_id = id;
        inner.reconnect_at = None;
        inner.reconnect_deferred = false;
        inner.state = ConnectionState::Connecting;

        debug!(%id, address = %self.address, attempt = inner.retry.attempt_count, "Connecting");

        let events = LinkEvents::new(id, self.events_tx.clone());
        match self.connector.open(&self.address, &self.protocols, events) {
            Ok(handle) => inner.link = Some(ActiveLink { id, handle }),
            Err(e) => {
                warn!(%id, error = %e, "Link construction failed");
                outbox.push(ChannelEvent::error(e));
                self.on_closed(inner, CLOSE_ABNORMAL, String::new(), outbox);
            }
        }
    }

    /// `Connecting → Open`.
    fn on_open(&self, inner: &mut Inner, outbox: &mut Outbox) {
        if inner.state != ConnectionState::Connecting {
            trace!(state = %inner.state, "Ignoring open outside Connecting");
            return;
        }

        let now = Instant::now();
        inner.state = ConnectionState::Open;
        inner.retry.attempt_count = 0;
        inner
            .heartbeat
            .start(now, self.config.heartbeat_interval(), self.config.heartbeat_timeout());

        let flushed = self.flush(inner, outbox);
        info!(address = %self.address, flushed, "Channel open");
        outbox.push(ChannelEvent::Open);

        if self.config.request_state_on_open {
            inner.state_request_at = Some(now + self.config.state_request_delay());
        }
    }

    /// `* → Closed`, scheduling a reconnect unless closed by the caller.
    fn on_closed(&self, inner: &mut Inner, code: u16, reason: String, outbox: &mut Outbox) {
        inner.link = None;
        inner.state = ConnectionState::Closed;
        inner.heartbeat.stop();
        inner.state_request_at = None;
        outbox.push(ChannelEvent::Close { code, reason });

        if !inner.retry.forced_close && inner.auto_reconnect {
            self.schedule_reconnect(inner);
        }
    }

    fn schedule_reconnect(&self, inner: &mut Inner) {
        let max_retries = self.config.max_retries;
        if inner.retry.exhausted(max_retries) {
            warn!(max_retries, "Max reconnect attempts reached");
            return;
        }

        let delay = backoff::next_delay(inner.retry.attempt_count, &self.config, &mut *inner.random);
        inner.retry.attempt_count += 1;
        inner.reconnect_at = Some(Instant::now() + delay);

        info!(
            attempt = inner.retry.attempt_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnect scheduled"
        );
    }

    /// Advisory connect from an environment signal.
    fn nudge(&self, inner: &mut Inner, outbox: &mut Outbox) {
        if !inner.auto_reconnect || inner.link.is_some() {
            return;
        }
        if inner.retry.exhausted(self.config.max_retries) && !inner.reconnect_deferred {
            debug!("Retries exhausted, nudge ignored");
            return;
        }
        self.start_link(inner, outbox);
    }

    /// Drains the queue into the open link. Returns the number sent.
    fn flush(&self, inner: &mut Inner, outbox: &mut Outbox) -> usize {
        let Some(link) = inner.link.as_ref() else {
            return 0;
        };

        let (sent, failure) = inner.queue.drain_with(|frame| link.handle.send(frame));
        if let Some(e) = failure {
            warn!(error = %e, remaining = inner.queue.len(), "Queue flush interrupted");
            outbox.push(ChannelEvent::error(e));
        }
        sent
    }

    /// Transmits when open, queues otherwise.
    fn transmit(&self, inner: &mut Inner, frame: String, outbox: &mut Outbox) -> bool {
        if inner.state == ConnectionState::Open
            && let Some(link) = inner.link.as_ref()
        {
            return match link.handle.send(&frame) {
                Ok(()) => {
                    trace!(len = frame.len(), "Frame sent");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Send failed, frame requeued");
                    inner.queue.requeue(frame);
                    outbox.push(ChannelEvent::error(e));
                    false
                }
            };
        }

        if let Err(e) = inner.queue.push(frame) {
            warn!(error = %e, "Frame rejected");
            outbox.push(ChannelEvent::error(e));
        } else {
            trace!(queued = inner.queue.len(), state = %inner.state, "Frame queued");
        }
        false
    }

    fn transmit_tagged<T>(&self, inner: &mut Inner, payload: &T, outbox: &mut Outbox) -> bool
    where
        T: Serialize + ?Sized,
    {
        match encode_tagged(payload, &self.config.client_id) {
            Ok(frame) => self.transmit(inner, frame, outbox),
            Err(e) => {
                outbox.push(ChannelEvent::error(e));
                false
            }
        }
    }
}
