//! Shared playback synchronization.
//!
//! [`PlaybackSync`] sits between a local [`Player`] and the channel. Local
//! player events become outbound [`AppMessage`]s; inbound playback frames are
//! applied to the player with latency compensation.
//!
//! Applying a remote command makes the player emit the same events a user
//! would. Those echoes are swallowed for a short window so they are not
//! broadcast back:
//!
//! | Inbound | Window |
//! |---------|--------|
//! | `play` / `pause` / `seek` / `keyframe` | 50 ms |
//! | `player_state` | 150 ms |
//! | `playlist_change`, local playlist select | 200 ms |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::protocol::{AppMessage, Inbound, PlaybackCommand, PlayerState, PlaylistItem, now_ms};

// ============================================================================
// Constants
// ============================================================================

/// Echo window after a remote play/pause/seek/keyframe.
pub const COMMAND_SUPPRESSION: Duration = Duration::from_millis(50);

/// Echo window after a replayed room state.
pub const STATE_SUPPRESSION: Duration = Duration::from_millis(150);

/// Echo window after a playlist switch.
pub const PLAYLIST_SUPPRESSION: Duration = Duration::from_millis(200);

/// Minimum spacing between broadcast seeks.
pub const SEEK_THROTTLE: Duration = Duration::from_millis(500);

/// Drift tolerated before a seek/keyframe corrects the position, in seconds.
pub const DRIFT_THRESHOLD_SECS: f64 = 0.5;

/// Period between host keyframes.
pub const KEYFRAME_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Player
// ============================================================================

/// The local media player.
///
/// Implementations must not call back into [`PlaybackSync`] synchronously
/// from these methods; player events are delivered later through
/// [`PlaybackSync::on_local`].
pub trait Player {
    /// Current position in seconds.
    fn current_time(&self) -> f64;

    /// Returns `true` while paused.
    fn is_paused(&self) -> bool;

    /// Returns `true` once a source has been loaded.
    fn has_source(&self) -> bool;

    /// Jumps to `time` seconds.
    fn seek(&mut self, time: f64);

    /// Starts playback. Autoplay refusals are the player's concern.
    fn play(&mut self);

    /// Pauses playback.
    fn pause(&mut self);

    /// Replaces the source with an HLS manifest.
    fn load(&mut self, hls_url: &str);
}

// ============================================================================
// Moment
// ============================================================================

/// A point in time on both clocks the synchronizer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// Monotonic time for suppression windows and throttling.
    pub at: Instant,
    /// Wall-clock epoch milliseconds for latency compensation.
    pub epoch_ms: u64,
}

impl Moment {
    /// Reads both clocks.
    #[must_use]
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            epoch_ms: now_ms(),
        }
    }

    /// Returns this moment advanced by `elapsed` on both clocks.
    #[must_use]
    pub fn after(self, elapsed: Duration) -> Self {
        Self {
            at: self.at + elapsed,
            epoch_ms: self
                .epoch_ms
                .saturating_add(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

// ============================================================================
// LocalEvent
// ============================================================================

/// Event raised by the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEvent {
    /// Playback started.
    Play,
    /// Playback paused.
    Pause,
    /// A seek completed.
    Seeked,
}

// ============================================================================
// PlaybackSync
// ============================================================================

/// Keeps a local player in step with the room.
#[derive(Debug)]
pub struct PlaybackSync<P> {
    player: P,
    is_host: bool,
    /// Local events before this instant are echoes. Consumed by the first one.
    suppress_until: Option<Instant>,
    last_seek_sent: Option<Instant>,
    awaiting_state: bool,
}

impl<P: Player> PlaybackSync<P> {
    /// Wraps `player`. Hosts also emit keyframes.
    #[must_use]
    pub fn new(player: P, is_host: bool) -> Self {
        Self {
            player,
            is_host,
            suppress_until: None,
            last_seek_sent: None,
            awaiting_state: true,
        }
    }

    /// Returns the player.
    #[inline]
    pub fn player(&self) -> &P {
        &self.player
    }

    /// Returns the player mutably.
    #[inline]
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// Returns `true` for the room host.
    #[inline]
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Returns `true` until any room state, playlist change or playback
    /// command has been applied.
    #[inline]
    #[must_use]
    pub fn awaiting_state(&self) -> bool {
        self.awaiting_state
    }

    /// Turns a local player event into a broadcast frame.
    ///
    /// Returns `None` for echoes of applied remote commands and for seeks
    /// closer than [`SEEK_THROTTLE`] to the previous one.
    pub fn on_local(&mut self, event: LocalEvent, now: Moment) -> Option<AppMessage> {
        if event == LocalEvent::Seeked {
            if self
                .last_seek_sent
                .is_some_and(|last| now.at.duration_since(last) < SEEK_THROTTLE)
            {
                trace!("Seek throttled");
                return None;
            }
            self.last_seek_sent = Some(now.at);
        }

        if self.suppress_until.take().is_some_and(|until| now.at < until) {
            trace!(?event, "Suppressed echo of remote command");
            return None;
        }

        let time = self.player.current_time();
        let ts = now.epoch_ms;

        Some(match event {
            LocalEvent::Play => AppMessage::Play { time, ts },
            LocalEvent::Pause => AppMessage::Pause { time, ts },
            LocalEvent::Seeked => AppMessage::Seek { time, ts },
        })
    }

    /// Builds a keyframe when hosting and playing.
    pub fn keyframe(&self, now: Moment) -> Option<AppMessage> {
        (self.is_host && !self.player.is_paused()).then(|| AppMessage::Keyframe {
            time: self.player.current_time(),
            ts: now.epoch_ms,
        })
    }

    /// Switches to `item` locally and returns the frame announcing it.
    pub fn select(&mut self, item: PlaylistItem, now: Moment) -> AppMessage {
        self.switch_to(&item, now, true);
        AppMessage::PlaylistSelect {
            ts: now.epoch_ms,
            item,
        }
    }

    /// Starts `item` when no room state arrived and nothing is loaded.
    ///
    /// The resulting player events are not suppressed, so the room follows.
    /// Returns `true` if the item was started.
    pub fn start_fallback(&mut self, item: &PlaylistItem, now: Moment) -> bool {
        if !self.awaiting_state || self.player.has_source() {
            self.awaiting_state = false;
            return false;
        }

        debug!(title = ?item.title, "No room state received, starting fallback item");
        self.switch_to(item, now, false);
        self.awaiting_state = false;
        true
    }

    /// Applies an inbound frame. Non-playback frames are ignored.
    pub fn apply(&mut self, inbound: &Inbound, now: Moment) {
        match inbound {
            Inbound::PlayerState { state } => self.apply_state(state, now),
            Inbound::PlaylistChange { item } => {
                if item.hls_url.is_some() {
                    self.switch_to(item, now, true);
                } else {
                    trace!("Playlist change without a source ignored");
                }
                self.awaiting_state = false;
            }
            Inbound::Play(cmd) => {
                self.seek_compensated(cmd, now);
                self.player.play();
                self.suppress(now, COMMAND_SUPPRESSION);
                self.awaiting_state = false;
            }
            Inbound::Pause(cmd) => {
                self.seek_compensated(cmd, now);
                self.player.pause();
                self.suppress(now, COMMAND_SUPPRESSION);
                self.awaiting_state = false;
            }
            Inbound::Seek(cmd) | Inbound::Keyframe(cmd) => {
                if let Some(time) = cmd.time
                    && (self.player.current_time() - time).abs() > DRIFT_THRESHOLD_SECS
                {
                    trace!(time, "Correcting drift");
                    self.player.seek(time);
                }
                self.suppress(now, COMMAND_SUPPRESSION);
                self.awaiting_state = false;
            }
            Inbound::Message(_) | Inbound::Participants { .. } | Inbound::History { .. } => {}
        }
    }

    fn apply_state(&mut self, state: &PlayerState, now: Moment) {
        self.awaiting_state = false;

        if let Some(url) = state.hls_url.as_deref() {
            self.player.load(url);
        }
        if let Some(time) = state.time {
            self.player.seek(time + latency_secs(state.ts, now));
        }
        if state.is_playing {
            self.player.play();
        } else {
            self.player.pause();
        }

        self.suppress(now, STATE_SUPPRESSION);
    }

    fn switch_to(&mut self, item: &PlaylistItem, now: Moment, suppress: bool) {
        if let Some(url) = item.hls_url.as_deref() {
            self.player.load(url);
        }
        self.player.play();

        if suppress {
            self.suppress(now, PLAYLIST_SUPPRESSION);
        } else {
            self.suppress_until = None;
        }
    }

    fn seek_compensated(&mut self, cmd: &PlaybackCommand, now: Moment) {
        if let Some(time) = cmd.time {
            self.player.seek(time + latency_secs(cmd.ts, now));
        }
    }

    fn suppress(&mut self, now: Moment, window: Duration) {
        self.suppress_until = Some(now.at + window);
    }
}

/// One-way delay of a frame stamped at `ts`, in seconds. Zero when unstamped.
fn latency_secs(ts: Option<u64>, now: Moment) -> f64 {
    ts.map_or(0.0, |ts| (now.epoch_ms as f64 - ts as f64) / 1000.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct FakePlayer {
        time: f64,
        paused: bool,
        source: Option<String>,
        seeks: Vec<f64>,
    }

    impl Player for FakePlayer {
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
            self.seeks.push(time);
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

    fn sync(is_host: bool) -> PlaybackSync<FakePlayer> {
        PlaybackSync::new(
            FakePlayer {
                paused: true,
                ..FakePlayer::default()
            },
            is_host,
        )
    }

    fn moment() -> Moment {
        Moment {
            at: Instant::now(),
            epoch_ms: 1_700_000_000_000,
        }
    }

    fn cmd(time: f64, ts: u64) -> PlaybackCommand {
        PlaybackCommand {
            time: Some(time),
            ts: Some(ts),
        }
    }

    #[test]
    fn test_local_play_broadcasts_position() {
        let mut s = sync(false);
        s.player_mut().time = 12.5;
        let now = moment();

        assert_eq!(
            s.on_local(LocalEvent::Play, now),
            Some(AppMessage::Play {
                time: 12.5,
                ts: now.epoch_ms
            })
        );
    }

    #[test]
    fn test_remote_play_compensates_latency() {
        let mut s = sync(false);
        let now = moment();

        s.apply(&Inbound::Play(cmd(10.0, now.epoch_ms - 250)), now);

        assert!((s.player().time - 10.25).abs() < 1e-9);
        assert!(!s.player().paused);
        assert!(!s.awaiting_state());
    }

    #[test]
    fn test_remote_pause_seeks_then_pauses() {
        let mut s = sync(false);
        s.player_mut().paused = false;
        let now = moment();

        s.apply(&Inbound::Pause(cmd(30.0, now.epoch_ms)), now);

        assert_eq!(s.player().seeks, [30.0]);
        assert!(s.player().paused);
    }

    #[test]
    fn test_echo_suppressed_inside_window_only() {
        let mut s = sync(false);
        let now = moment();

        s.apply(&Inbound::Play(cmd(1.0, now.epoch_ms)), now);
        assert_eq!(s.on_local(LocalEvent::Play, now.after(Duration::from_millis(10))), None);

        // Consumed by the first echo.
        assert!(s.on_local(LocalEvent::Pause, now.after(Duration::from_millis(20))).is_some());

        s.apply(&Inbound::Pause(cmd(1.0, now.epoch_ms)), now);
        assert!(s.on_local(LocalEvent::Pause, now.after(COMMAND_SUPPRESSION)).is_some());
    }

    #[test]
    fn test_player_state_window_is_longer() {
        let mut s = sync(false);
        let now = moment();
        let state = PlayerState {
            time: Some(42.0),
            ts: Some(now.epoch_ms - 1_000),
            is_playing: true,
            hls_url: Some("/media/7/master.m3u8".into()),
            video_id: None,
        };

        s.apply(&Inbound::PlayerState { state }, now);

        assert_eq!(s.player().source.as_deref(), Some("/media/7/master.m3u8"));
        assert!((s.player().time - 43.0).abs() < 1e-9);
        assert!(!s.player().paused);
        assert_eq!(s.on_local(LocalEvent::Play, now.after(Duration::from_millis(120))), None);
    }

    #[test]
    fn test_paused_state_pauses() {
        let mut s = sync(false);
        s.player_mut().paused = false;

        s.apply(
            &Inbound::PlayerState {
                state: PlayerState::default(),
            },
            moment(),
        );

        assert!(s.player().paused);
        assert!(s.player().seeks.is_empty());
    }

    #[test]
    fn test_drift_correction_threshold() {
        let mut s = sync(false);
        s.player_mut().time = 100.0;
        let now = moment();

        s.apply(&Inbound::Keyframe(cmd(100.4, now.epoch_ms)), now);
        assert!(s.player().seeks.is_empty());

        s.apply(&Inbound::Seek(cmd(101.0, now.epoch_ms - 5_000)), now);
        // No latency compensation for corrections.
        assert_eq!(s.player().seeks, [101.0]);
    }

    #[test]
    fn test_seek_throttle() {
        let mut s = sync(false);
        let now = moment();

        assert!(s.on_local(LocalEvent::Seeked, now).is_some());
        assert!(s.on_local(LocalEvent::Seeked, now.after(Duration::from_millis(499))).is_none());
        assert!(s.on_local(LocalEvent::Seeked, now.after(Duration::from_millis(500))).is_some());
    }

    #[test]
    fn test_keyframes_only_from_playing_host() {
        let now = moment();

        let mut host = sync(true);
        assert_eq!(host.keyframe(now), None);
        host.player_mut().paused = false;
        host.player_mut().time = 7.0;
        assert_eq!(
            host.keyframe(now),
            Some(AppMessage::Keyframe {
                time: 7.0,
                ts: now.epoch_ms
            })
        );

        let mut guest = sync(false);
        guest.player_mut().paused = false;
        assert_eq!(guest.keyframe(now), None);
    }

    #[test]
    fn test_playlist_change_loads_and_plays() {
        let mut s = sync(false);
        let now = moment();
        let item = PlaylistItem {
            hls_url: Some("/media/2/master.m3u8".into()),
            ..PlaylistItem::default()
        };

        s.apply(&Inbound::PlaylistChange { item }, now);

        assert_eq!(s.player().source.as_deref(), Some("/media/2/master.m3u8"));
        assert!(!s.player().paused);
        assert_eq!(s.on_local(LocalEvent::Play, now.after(Duration::from_millis(199))), None);
    }

    #[test]
    fn test_playlist_change_without_source_only_ends_wait() {
        let mut s = sync(false);
        let now = moment();
        let item = PlaylistItem {
            title: Some("Episode 3".into()),
            ..PlaylistItem::default()
        };

        s.apply(&Inbound::PlaylistChange { item }, now);

        assert!(!s.awaiting_state());
        assert_eq!(s.player().source, None);
        assert!(s.player().paused);
        assert!(s.on_local(LocalEvent::Pause, now).is_some());
    }

    #[test]
    fn test_select_returns_announcement() {
        let mut s = sync(true);
        let now = moment();
        let item = PlaylistItem {
            hls_url: Some("/media/3/master.m3u8".into()),
            title: Some("Pilot".into()),
            ..PlaylistItem::default()
        };

        let msg = s.select(item.clone(), now);

        assert_eq!(
            msg,
            AppMessage::PlaylistSelect {
                ts: now.epoch_ms,
                item
            }
        );
        assert_eq!(s.player().source.as_deref(), Some("/media/3/master.m3u8"));
    }

    #[test]
    fn test_fallback_only_without_state() {
        let item = PlaylistItem {
            hls_url: Some("/media/1/master.m3u8".into()),
            ..PlaylistItem::default()
        };
        let now = moment();

        let mut fresh = sync(false);
        assert!(fresh.start_fallback(&item, now));
        assert!(!fresh.player().paused);
        // Not suppressed: the room hears the resulting play.
        assert!(fresh.on_local(LocalEvent::Play, now).is_some());

        let mut synced = sync(false);
        synced.apply(&Inbound::Play(cmd(0.0, now.epoch_ms)), now);
        assert!(!synced.start_fallback(&item, now));
    }

    #[test]
    fn test_chat_frames_ignored() {
        let mut s = sync(false);
        s.apply(
            &Inbound::Participants {
                participants: vec!["a".into()],
            },
            moment(),
        );
        assert!(s.awaiting_state());
    }
}
