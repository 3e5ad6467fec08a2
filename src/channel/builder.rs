//! Builder pattern for channel construction.
//!
//! # Example
//!
//! ```no_run
//! use reconnecting_channel::{ChannelBuilder, ChannelConfig};
//!
//! # fn example() -> reconnecting_channel::Result<()> {
//! let channel = ChannelBuilder::new("ws://localhost:8000/ws/party/1/")
//!     .config(ChannelConfig::new().with_heartbeat(15_000, 5_000))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::{Connector, WsConnector};

use super::backoff::{RandomSource, SystemRandom};
use super::core::Channel;
use super::driver;
use super::lifecycle::Shared;
use super::options::ChannelConfig;

// ============================================================================
// ChannelBuilder
// ============================================================================

/// Builder for a [`Channel`].
///
/// Use [`Channel::builder()`] or [`ChannelBuilder::new`].
pub struct ChannelBuilder {
    /// Remote address, handed to the connector verbatim.
    address: String,
    /// WebSocket subprotocols.
    protocols: Vec<String>,
    /// Reconnect, heartbeat and queue settings.
    config: ChannelConfig,
    /// Link factory; WebSocket when unset.
    connector: Option<Box<dyn Connector>>,
    /// Jitter source; OS-seeded when unset.
    random: Option<Box<dyn RandomSource>>,
}

impl fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("address", &self.address)
            .field("protocols", &self.protocols)
            .field("config", &self.config)
            .field("custom_connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ChannelBuilder Implementation
// ============================================================================

impl ChannelBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            protocols: Vec::new(),
            config: ChannelConfig::default(),
            connector: None,
            random: None,
        }
    }

    /// Adds a WebSocket subprotocol.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Replaces the subprotocol list.
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the channel configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the link factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Replaces the jitter source.
    #[inline]
    #[must_use]
    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Some(Box::new(random));
        self
    }

    /// Builds the channel, spawns its driver task and starts connecting.
    ///
    /// A malformed address is not an error here: the first connect attempt
    /// fails and is retried like any other closure.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Config`] if called outside a tokio runtime
    pub fn build(self) -> Result<Channel> {
        self.config.validate()?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("Channel requires a tokio runtime: {e}")))?;

        let connector: Box<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Box::new(WsConnector::new()),
        };
        let random: Box<dyn RandomSource> = match self.random {
            Some(random) => random,
            None => Box::new(SystemRandom::new()),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(
            self.address,
            self.protocols,
            self.config,
            connector,
            random,
            events_tx,
        ));

        runtime.spawn(driver::run(Arc::clone(&shared), events_rx));

        let channel = Channel::from_shared(shared);
        channel.connect();
        Ok(channel)
    }
}

// ============================================================================
// Tests
// ============================================================================
