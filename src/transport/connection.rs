//! WebSocket link and its I/O loop.
//!
//! [`WsConnector::open`] validates the address, spawns one task per link and
//! returns a [`WsLink`] at once. The task performs the handshake and then
//! shuttles frames between the socket and the link's command channel.
//!
//! # Event Loop
//!
//! The spawned task handles:
//!
//! - Inbound text frames, reported as [`LinkEvent::Message`]
//! - Outbound frames queued by [`Link::send`]
//! - The close handshake, in either direction
//!
//! Every write and the whole close handshake are bounded by the connector's
//! I/O timeout, so a stalled socket still reports closure.
//!
//! Every exit path reports exactly one [`LinkEvent::Closed`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::link::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Link, LinkEvents};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for one write and for the whole close handshake.
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the peer's close frame carries no status.
const CLOSE_NO_STATUS: u16 = 1005;

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the I/O loop.
#[derive(Debug)]
enum LinkCommand {
    /// Write a text frame.
    Send(String),
    /// Start the close handshake.
    Close { code: u16, reason: String },
}

// ============================================================================
// WsConnector
// ============================================================================

/// [`Connector`] for `ws://` and `wss://` addresses.
///
/// `wss://` requires the `tls` feature.
#[derive(Debug, Clone)]
pub struct WsConnector {
    io_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl WsConnector {
    /// Creates a connector with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a single write, or the close handshake as a whole,
    /// may take before the link is abandoned.
    #[inline]
    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

impl Connector for WsConnector {
    fn open(&self, address: &str, protocols: &[String], events: LinkEvents) -> Result<Box<dyn Link>> {
        let request = client_request(address, protocols)?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::connection(format!("No tokio runtime to drive the link: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_link(request, command_rx, events, self.io_timeout));

        Ok(Box::new(WsLink { command_tx }))
    }
}

/// Builds the handshake request for `address`.
fn client_request(address: &str, protocols: &[String]) -> Result<Request> {
    let url = Url::parse(address).map_err(|e| Error::invalid_address(address, e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::invalid_address(
                address,
                format!("unsupported scheme `{other}`"),
            ));
        }
    }

    let mut request = url.as_str().into_client_request()?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| Error::invalid_address(address, format!("invalid subprotocol: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

// ============================================================================
// WsLink
// ============================================================================

/// Handle to one WebSocket link.
///
/// Frames are handed to the I/O task without waiting for the network.
#[derive(Debug)]
pub struct WsLink {
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl Link for WsLink {
    fn send(&self, frame: &str) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Send(frame.to_owned()))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.command_tx.send(LinkCommand::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

// ============================================================================
// I/O Loop
// ============================================================================

async fn run_link(
    request: Request,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    events: LinkEvents,
    io_timeout: Duration,
) {
    let id = events.id();
    debug!(%id, uri = %request.uri(), "Opening WebSocket");

    // Handshake; a close request aborts it.
    let mut pending = Vec::new();
    let handshake = connect_async(request);
    tokio::pin!(handshake);

    let stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    warn!(%id, error = %e, "WebSocket handshake failed");
                    events.error(e.to_string());
                    events.closed(CLOSE_ABNORMAL, "");
                    return;
                }
            },

            command = command_rx.recv() => match command {
                Some(LinkCommand::Send(frame)) => pending.push(frame),
                Some(LinkCommand::Close { code, reason }) => {
                    debug!(%id, "Closed during handshake");
                    events.closed(code, reason);
                    return;
                }
                None => return,
            },
        }
    };

    debug!(%id, "WebSocket open");
    events.opened();

    let (mut ws_write, mut ws_read) = stream.split();

    let mut flush_failure = None;
    for frame in pending {
        if let Err(e) = write_frame(&mut ws_write, Message::Text(frame.into()), io_timeout).await {
            flush_failure = Some(e);
            break;
        }
    }

    let (code, reason) = loop {
        if let Some(e) = flush_failure.take() {
            warn!(%id, error = %e, "Failed to send buffered frame");
            events.error(e.to_string());
            break (CLOSE_ABNORMAL, String::new());
        }

        tokio::select! {
            // Incoming frames from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => events.message(text.as_str()),

                    Some(Ok(Message::Close(frame))) => {
                        debug!(%id, ?frame, "WebSocket closed by remote");
                        let _ = timeout(io_timeout, ws_write.close()).await;
                        break frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                            (u16::from(f.code), f.reason.as_str().to_owned())
                        });
                    }

                    Some(Err(e)) => {
                        warn!(%id, error = %e, "WebSocket error");
                        events.error(e.to_string());
                        break (CLOSE_ABNORMAL, String::new());
                    }

                    None => {
                        debug!(%id, "WebSocket stream ended");
                        break (CLOSE_ABNORMAL, String::new());
                    }

                    // Ignore Binary, Ping, Pong
                    Some(Ok(_)) => {}
                }
            }

            // Commands from the channel
            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(frame)) => {
                        trace!(%id, len = frame.len(), "Writing frame");
                        if let Err(e) = write_frame(&mut ws_write, Message::Text(frame.into()), io_timeout).await {
                            warn!(%id, error = %e, "Failed to write frame");
                            events.error(e.to_string());
                            break (CLOSE_ABNORMAL, String::new());
                        }
                    }

                    Some(LinkCommand::Close { code, reason }) => {
                        close_handshake(&mut ws_write, &mut ws_read, code, &reason, io_timeout).await;
                        break (code, reason);
                    }

                    None => {
                        debug!(%id, "Link handle dropped");
                        let _ = timeout(io_timeout, ws_write.close()).await;
                        break (CLOSE_NORMAL, String::new());
                    }
                }
            }
        }
    };

    events.closed(code, reason);
    debug!(%id, code, "Link task terminated");
}

/// Writes one frame, giving up after `wait`.
async fn write_frame<W>(ws_write: &mut W, message: Message, wait: Duration) -> Result<()>
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    match timeout(wait, ws_write.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::connection(e.to_string())),
        Err(_) => Err(Error::connection(format!(
            "write stalled for {} ms",
            wait.as_millis()
        ))),
    }
}

/// Sends a close frame and waits for the peer's answer, all within `wait`.
async fn close_handshake<W, R>(ws_write: &mut W, ws_read: &mut R, code: u16, reason: &str, wait: Duration)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    };

    let handshake = async {
        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not sent");
            return;
        }
        while let Some(Ok(message)) = ws_read.next().await {
            if message.is_close() {
                break;
            }
        }
    };

    if timeout(wait, handshake).await.is_err() {
        debug!(wait_ms = wait.as_millis() as u64, "Close handshake timed out");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::Pin;
    use std::task::{Context, Poll};

    use anyhow::anyhow;
    use futures_util::stream;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    use crate::identifiers::LinkId;
    use crate::transport::LinkEvent;

    type Events = mpsc::UnboundedReceiver<(LinkId, LinkEvent)>;

    const WAIT: Duration = Duration::from_secs(5);

    fn events() -> (LinkEvents, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LinkEvents::new(LinkId::new(7), tx), rx)
    }

    async fn next_event(rx: &mut Events) -> anyhow::Result<LinkEvent> {
        let (id, event) = timeout(WAIT, rx.recv())
            .await?
            .ok_or_else(|| anyhow!("event channel closed"))?;
        assert_eq!(id, LinkId::new(7));
        Ok(event)
    }

    /// Sink whose peer never drains the socket.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), WsError>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> std::result::Result<(), WsError> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), WsError>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), WsError>> {
            Poll::Pending
        }
    }

    /// Echoes text frames until the client closes.
    async fn echo_server() -> anyhow::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/ws/party/1/", listener.local_addr()?);

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await
                && let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await
            {
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() {
                        let _ = ws.send(message).await;
                    }
                }
            }
        });

        Ok(url)
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = client_request("http://localhost/ws/", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_rejects_malformed_address() {
        let err = client_request("not an address", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_subprotocol_header() {
        let protocols = vec!["party.v2".to_string(), "party.v1".to_string()];
        let request = client_request("ws://localhost:8000/ws/", &protocols).unwrap();

        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "party.v2, party.v1"
        );
    }

    #[tokio::test]
    async fn test_open_fails_synchronously_for_bad_address() {
        let (events, _rx) = events();
        let result = WsConnector::new().open("ftp://example.com", &[], events);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_round_trip_and_close() -> anyhow::Result<()> {
        let url = echo_server().await?;
        let (events, mut rx) = events();
        let link = WsConnector::new().open(&url, &[], events)?;

        assert_eq!(next_event(&mut rx).await?, LinkEvent::Open);

        link.send(r#"{"type":"chat","message":"hi"}"#)?;
        assert_eq!(
            next_event(&mut rx).await?,
            LinkEvent::Message(r#"{"type":"chat","message":"hi"}"#.into())
        );

        link.close(1000, "done");
        assert_eq!(
            next_event(&mut rx).await?,
            LinkEvent::Closed {
                code: 1000,
                reason: "done".into()
            }
        );

        // The task is gone; the handle reports it.
        tokio::task::yield_now().await;
        assert!(timeout(WAIT, async {
            while link.send("late").is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .is_ok());

        Ok(())
    }

    #[tokio::test]
    async fn test_remote_close_reported_with_code() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/", listener.local_addr()?);

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await
                && let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await
            {
                let frame = CloseFrame {
                    code: CloseCode::from(4000),
                    reason: "kicked".to_string().into(),
                };
                let _ = ws.close(Some(frame)).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        let (events, mut rx) = events();
        let _link = WsConnector::new().open(&url, &[], events)?;

        assert_eq!(next_event(&mut rx).await?, LinkEvent::Open);
        assert_eq!(
            next_event(&mut rx).await?,
            LinkEvent::Closed {
                code: 4000,
                reason: "kicked".into()
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/", listener.local_addr()?);
        drop(listener);

        let (events, mut rx) = events();
        let _link = WsConnector::new().open(&url, &[], events)?;

        assert!(matches!(next_event(&mut rx).await?, LinkEvent::Error(_)));
        assert_eq!(
            next_event(&mut rx).await?,
            LinkEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: String::new()
            }
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_gives_up() {
        let wait = Duration::from_millis(750);
        let started = Instant::now();

        let result = write_frame(&mut StalledSink, Message::Text("hi".into()), wait).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.to_string().contains("stalled"));
        assert!(started.elapsed() >= wait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_handshake_bounded_when_close_frame_stalls() {
        let wait = Duration::from_millis(750);
        let started = Instant::now();
        let mut reader = stream::pending::<std::result::Result<Message, WsError>>();

        close_handshake(&mut StalledSink, &mut reader, 1000, "heartbeat timeout", wait).await;

        assert!(started.elapsed() >= wait);
        assert!(started.elapsed() < wait * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_handshake_bounded_when_peer_never_answers() {
        let wait = Duration::from_millis(750);
        let started = Instant::now();
        let mut writer = futures_util::sink::drain();
        let mut reader = stream::pending::<std::result::Result<Message, WsError>>();

        close_handshake(&mut writer, &mut reader, 1000, "", wait).await;

        assert!(started.elapsed() >= wait);
        assert!(started.elapsed() < wait * 2);
    }
}
