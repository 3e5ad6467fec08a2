//! In-memory connector for tests.
//!
//! Records every link it opens; tests drive the link lifecycle by hand.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::link::{CLOSE_ABNORMAL, Connector, Link, LinkEvents};

// ============================================================================
// MockLink
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct LinkState {
    pub(crate) sent: Vec<String>,
    pub(crate) closed: Option<(u16, String)>,
    pub(crate) fail_sends: bool,
}

/// Test-side view of one opened link.
#[derive(Debug, Clone)]
pub(crate) struct MockLink {
    pub(crate) events: LinkEvents,
    pub(crate) state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub(crate) fn close_request(&self) -> Option<(u16, String)> {
        self.state.lock().closed.clone()
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }
}

struct MockHandle {
    events: LinkEvents,
    state: Arc<Mutex<LinkState>>,
}

impl Link for MockHandle {
    fn send(&self, frame: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_sends || state.closed.is_some() {
            return Err(Error::ConnectionClosed);
        }
        state.sent.push(frame.to_owned());
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some((code, reason.to_owned()));
            self.events.closed(code, reason);
        }
    }
}

// ============================================================================
// MockConnector
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Links stay pending until the test emits events.
    Manual,
    /// Every link closes right after being opened.
    CloseImmediately,
    /// Construction fails.
    Refuse,
}

#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    links: Arc<Mutex<Vec<MockLink>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
    behavior: Arc<Mutex<Behavior>>,
}

impl MockConnector {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            links: Arc::default(),
            attempts: Arc::default(),
            behavior: Arc::new(Mutex::new(behavior)),
        }
    }

    pub(crate) fn manual() -> Self {
        Self::new(Behavior::Manual)
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub(crate) fn links(&self) -> Vec<MockLink> {
        self.links.lock().clone()
    }

    pub(crate) fn last(&self) -> MockLink {
        self.links.lock().last().cloned().expect("no link opened")
    }

    /// Instants of every `open` call, including refused ones.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, address: &str, _protocols: &[String], events: LinkEvents) -> Result<Box<dyn Link>> {
        let now = Instant::now();
        self.attempts.lock().push(now);

        let behavior = *self.behavior.lock();
        if behavior == Behavior::Refuse {
            return Err(Error::invalid_address(address, "refused by mock"));
        }

        let state = Arc::new(Mutex::new(LinkState::default()));
        self.links.lock().push(MockLink {
            events: events.clone(),
            state: Arc::clone(&state),
        });

        if behavior == Behavior::CloseImmediately {
            state.lock().closed = Some((CLOSE_ABNORMAL, String::new()));
            events.closed(CLOSE_ABNORMAL, "");
        }

        Ok(Box::new(MockHandle { events, state }))
    }
}

/// Installs a test subscriber once; `RUST_LOG` controls verbosity.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
