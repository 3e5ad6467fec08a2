//! Watch-party session over a [`Channel`].
//!
//! Routes inbound frames to the chat room and the playback synchronizer,
//! broadcasts local player events while the channel is open, and runs the
//! host keyframe ticker.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::identifiers::ListenerId;
use crate::protocol::{ChatLine, Inbound, PlaylistItem};

use super::chat::ChatRoom;
use super::playback::{KEYFRAME_INTERVAL, LocalEvent, Moment, PlaybackSync, Player};

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for room state before starting the fallback item.
pub const INITIAL_STATE_GRACE: Duration = Duration::from_millis(1_500);

// ============================================================================
// WatchParty
// ============================================================================

/// A joined watch-party room.
///
/// Detaches from the channel and stops its background tasks on drop. The
/// channel itself stays open.
pub struct WatchParty<P> {
    channel: Channel,
    sync: Arc<Mutex<PlaybackSync<P>>>,
    chat: Arc<Mutex<ChatRoom>>,
    listener: ListenerId,
    tasks: Vec<JoinHandle<()>>,
}

impl<P> fmt::Debug for WatchParty<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchParty")
            .field("channel", &self.channel)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl<P> WatchParty<P>
where
    P: Player + Send + 'static,
{
    /// Joins the room carried by `channel`.
    ///
    /// When `fallback` is given and no room state arrives within
    /// [`INITIAL_STATE_GRACE`], that item is started locally.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn join(
        channel: Channel,
        sync: PlaybackSync<P>,
        chat: ChatRoom,
        fallback: Option<PlaylistItem>,
    ) -> Self {
        let is_host = sync.is_host();
        let sync = Arc::new(Mutex::new(sync));
        let chat = Arc::new(Mutex::new(chat));

        let listener = {
            let sync = Arc::clone(&sync);
            let chat = Arc::clone(&chat);
            channel.on_message(move |text| {
                let Some(inbound) = Inbound::parse(text) else {
                    return;
                };
                chat.lock().apply(&inbound);
                sync.lock().apply(&inbound, Moment::now());
            })
        };

        let mut tasks = Vec::new();

        if is_host {
            tasks.push(tokio::spawn(run_keyframes(channel.clone(), Arc::clone(&sync))));
        }

        if let Some(item) = fallback {
            let sync = Arc::clone(&sync);
            tasks.push(tokio::spawn(async move {
                sleep(INITIAL_STATE_GRACE).await;
                sync.lock().start_fallback(&item, Moment::now());
            }));
        }

        debug!(is_host, address = %channel.address(), "Joined watch party");

        Self {
            channel,
            sync,
            chat,
            listener,
            tasks,
        }
    }

    /// Reports a local player event. Returns `true` if it was broadcast.
    ///
    /// Playback commands are only meaningful live, so nothing is queued
    /// while the channel is down.
    pub fn local(&self, event: LocalEvent) -> bool {
        if !self.channel.is_open() {
            trace!(?event, "Channel not open, local event dropped");
            return false;
        }

        let message = self.sync.lock().on_local(event, Moment::now());
        message.is_some_and(|message| self.channel.send_tagged(&message))
    }

    /// Sends a chat line. Queued while disconnected. Returns `false` for
    /// blank input or when the frame was queued.
    pub fn say(&self, text: &str) -> bool {
        ChatRoom::compose(text).is_some_and(|message| self.channel.send_tagged(&message))
    }

    /// Switches to `item` and announces it when connected.
    pub fn select(&self, item: PlaylistItem) -> bool {
        let message = self.sync.lock().select(item, Moment::now());
        self.channel.is_open() && self.channel.send_tagged(&message)
    }

    /// Current participants.
    #[must_use]
    pub fn participants(&self) -> Vec<String> {
        self.chat.lock().participants().to_vec()
    }

    /// Chat lines received so far.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatLine> {
        self.chat.lock().messages().to_vec()
    }

    /// Runs `f` against the player.
    pub fn with_player<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(self.sync.lock().player_mut())
    }

    /// Returns the underlying channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl<P> Drop for WatchParty<P> {
    fn drop(&mut self) {
        self.channel.remove_listener(self.listener);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Sends a keyframe every [`KEYFRAME_INTERVAL`] while open and playing.
async fn run_keyframes<P>(channel: Channel, sync: Arc<Mutex<PlaybackSync<P>>>)
where
    P: Player + Send + 'static,
{
    let mut ticker = interval(KEYFRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !channel.is_open() {
            continue;
        }

        let keyframe = sync.lock().keyframe(Moment::now());
        if let Some(keyframe) = keyframe {
            channel.send_tagged(&keyframe);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;
    use tokio::task::yield_now;

    use crate::channel::{ChannelConfig, ConnectionState, EventKind, FixedRandom};
    use crate::transport::mock::{MockConnector, MockLink};

    #[derive(Debug, Default)]
    struct TestPlayer {
        time: f64,
        paused: bool,
        source: Option<String>,
    }

    impl Player for TestPlayer {
        fn current_time(&self) -> f64 {
            self.time
        }
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn has_source(&self) -> bool {
            self.source.is_some()
        }
        fn seek(&mut self, time: f64) {
            self.time = time;
        }
        fn play(&mut self) {
            self.paused = false;
        }
        fn pause(&mut self) {
            self.paused = true;
        }
        fn load(&mut self, hls_url: &str) {
            self.source = Some(hls_url.to_owned());
        }
    }

    async fn settle() {
        for _ in 0..16 {
            yield_now().await;
        }
    }

    fn channel(connector: &MockConnector) -> Channel {
        Channel::builder("ws://test.local/ws/room/9/")
            .config(
                ChannelConfig::new()
                    .with_client_id("viewer")
                    .without_heartbeat()
                    .with_request_state_on_open(false),
            )
            .connector(connector.clone())
            .random(FixedRandom(0.5))
            .build()
            .unwrap()
    }

    fn sent_types(link: &MockLink) -> Vec<String> {
        link.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter_map(|value| value["type"].as_str().map(str::to_owned))
            .collect()
    }

    fn player(paused: bool) -> PlaybackSync<TestPlayer> {
        PlaybackSync::new(
            TestPlayer {
                paused,
                ..TestPlayer::default()
            },
            false,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_frames_reach_chat_and_player() {
        let connector = MockConnector::manual();
        let party = WatchParty::join(channel(&connector), player(true), ChatRoom::new(), None);

        let link = connector.last();
        link.events.opened();
        link.events
            .message(r#"{"type":"participants","participants":["ann","bob"]}"#);
        link.events
            .message(r#"{"type":"message","username":"ann","message":"hi"}"#);
        link.events.message(r#"{"type":"play","time":3.0}"#);
        link.events.message("not json");
        settle().await;

        assert_eq!(party.participants(), ["ann", "bob"]);
        assert_eq!(party.messages().len(), 1);
        assert!(party.with_player(|p| !p.paused && (p.time - 3.0).abs() < 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_events_dropped_while_disconnected() {
        let connector = MockConnector::manual();
        let party = WatchParty::join(channel(&connector), player(false), ChatRoom::new(), None);

        assert!(!party.local(LocalEvent::Pause));
        assert_eq!(party.channel().queued(), 0);

        connector.last().events.opened();
        settle().await;

        assert!(party.local(LocalEvent::Pause));
        assert_eq!(sent_types(&connector.last()), ["pause"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_is_queued_until_open() {
        let connector = MockConnector::manual();
        let party = WatchParty::join(channel(&connector), player(true), ChatRoom::new(), None);

        assert!(!party.say("  hello  "));
        assert!(!party.say("   "));
        assert_eq!(party.channel().queued(), 1);

        let link = connector.last();
        link.events.opened();
        settle().await;

        let frame: Value = serde_json::from_str(&link.sent()[0]).unwrap();
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["message"], "hello");
        assert_eq!(frame["client_id"], "viewer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_sends_keyframes_while_playing() {
        let connector = MockConnector::manual();
        let sync = PlaybackSync::new(TestPlayer::default(), true);
        let party = WatchParty::join(channel(&connector), sync, ChatRoom::new(), None);

        let link = connector.last();
        link.events.opened();
        settle().await;

        sleep(KEYFRAME_INTERVAL * 2).await;
        settle().await;
        assert_eq!(sent_types(&link), ["keyframe", "keyframe"]);

        party.with_player(|p| p.paused = true);
        sleep(KEYFRAME_INTERVAL * 2).await;
        settle().await;
        assert_eq!(link.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_starts_without_room_state() {
        let connector = MockConnector::manual();
        let item = PlaylistItem {
            hls_url: Some("/media/1/master.m3u8".into()),
            ..PlaylistItem::default()
        };
        let party = WatchParty::join(channel(&connector), player(true), ChatRoom::new(), Some(item));

        sleep(INITIAL_STATE_GRACE).await;
        settle().await;

        assert_eq!(
            party.with_player(|p| p.source.clone()).as_deref(),
            Some("/media/1/master.m3u8")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_detaches_but_keeps_channel() {
        let connector = MockConnector::manual();
        let channel = channel(&connector);
        let party = WatchParty::join(channel.clone(), player(true), ChatRoom::new(), None);
        assert_eq!(channel.listener_count(EventKind::Message), 1);

        drop(party);

        assert_eq!(channel.listener_count(EventKind::Message), 0);
        assert_eq!(channel.state(), ConnectionState::Connecting);
    }
}
