//! Playback controller: one live session bridging an external player to
//! local UI state.
//!
//! The external player (mpv, see `mpv.rs`) is reached through the
//! [`PlayerHandle`] / [`PlayerFactory`] traits. Its callbacks arrive as
//! [`PlayerEvent`] values on a channel and are dispatched into the single
//! [`PlaybackController::handle_event`] transition function — the transition
//! table is the one source of truth, not scattered callback bodies.
//!
//! Commands issued before the player reports ready are remembered in a
//! pending set and applied once readiness arrives; they are never lost.
//! Commands issued with no session at all are silent no-ops.

use anyhow::Result;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::VideoItem;
use crate::constants::constants;

/// Discrete playback rates the controller will request.
pub const RATES: [f64; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

/// Lifecycle state of the active session. `Idle` means no session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
  Idle,
  Initializing,
  Ready,
  Playing,
  Paused,
  Buffering,
  Ended,
  Error,
}

impl PlaybackState {
  pub fn label(self) -> &'static str {
    match self {
      PlaybackState::Idle => "idle",
      PlaybackState::Initializing => "loading",
      PlaybackState::Ready => "ready",
      PlaybackState::Playing => "playing",
      PlaybackState::Paused => "paused",
      PlaybackState::Buffering => "buffering",
      PlaybackState::Ended => "ended",
      PlaybackState::Error => "error",
    }
  }
}

/// External player state-change payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalState {
  Playing,
  Paused,
  Buffering,
  Ended,
}

/// Notifications from the external player runtime.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
  /// Player finished initializing; reported media duration in seconds.
  Ready { duration: f64 },
  StateChange(ExternalState),
  /// Response to a position sample request, seconds from start.
  Position(f64),
  RateChange(f64),
  /// Fullscreen changed, possibly outside our control (e.g. the user pressed
  /// Escape in the player window). The controller's flag follows reality.
  FullscreenChange(bool),
  /// An optional platform feature was unavailable. Non-fatal: surfaced as a
  /// dismissible notice without altering playback state.
  Capability(String),
  Error(String),
}

/// Action the app should take after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
  /// Session ended with autoplay-next enabled: bind the next item.
  AdvanceNext,
  /// Show a dismissible informational notice.
  Notice(String),
}

/// Command surface of the external player. Implementations enqueue commands
/// fire-and-forget; results come back as [`PlayerEvent`]s.
pub trait PlayerHandle: Send {
  fn play(&self);
  fn pause(&self);
  fn seek(&self, secs: f64);
  /// Volume in `0.0..=1.0`.
  fn set_volume(&self, volume: f64);
  fn set_muted(&self, muted: bool);
  fn set_rate(&self, rate: f64);
  fn set_captions(&self, visible: bool);
  /// Request or leave fullscreen on the player's own window. Best-effort;
  /// failures come back as [`PlayerEvent::Capability`].
  fn set_fullscreen(&self, fullscreen: bool);
  /// Shrink the player into an always-on-top picture-in-picture window.
  /// Best-effort, same failure path as fullscreen.
  fn set_pip(&self, pip: bool);
  /// Ask for the current position; answered by [`PlayerEvent::Position`].
  fn request_position(&self);
  /// Release the external player. Must be safe to call once per handle.
  fn shutdown(&mut self);
}

/// Initial configuration bag handed to the player factory.
#[derive(Debug, Clone, Copy)]
pub struct PlayerOptions {
  pub autoplay: bool,
  pub volume: f64,
  pub muted: bool,
  pub rate: f64,
  pub captions: bool,
}

/// Constructs the external player for one media item. Invoked exactly once
/// per session; readiness arrives later as [`PlayerEvent::Ready`].
pub trait PlayerFactory {
  fn spawn(&self, item: &VideoItem, opts: &PlayerOptions)
  -> Result<(Box<dyn PlayerHandle>, mpsc::UnboundedReceiver<PlayerEvent>)>;
}

/// Commands accepted before readiness, replayed when `Ready` fires.
#[derive(Debug, Default, Clone, Copy)]
struct PendingCommands {
  play: bool,
  volume: Option<f64>,
  muted: Option<bool>,
  rate: Option<f64>,
  captions: Option<bool>,
}

struct Session {
  item: VideoItem,
  handle: Box<dyn PlayerHandle>,
  state: PlaybackState,
  error: Option<String>,
  position: f64,
  duration: f64,
  volume: f64,
  muted: bool,
  last_nonzero_volume: f64,
  rate: f64,
  captions: bool,
  fullscreen: bool,
  pip: bool,
  pending: PendingCommands,
  last_sample: Option<Instant>,
}

pub struct PlaybackController {
  session: Option<Session>,
  pub autoplay_next: bool,
  /// Settings carried across sessions and reapplied on re-initialization.
  volume: f64,
  muted: bool,
  rate: f64,
  captions: bool,
}

impl PlaybackController {
  pub fn new(volume: f64, rate: f64, captions: bool, autoplay_next: bool) -> Self {
    Self { session: None, autoplay_next, volume: volume.clamp(0.0, 1.0), muted: false, rate, captions }
  }

  // --- Accessors ---

  pub fn state(&self) -> PlaybackState {
    self.session.as_ref().map_or(PlaybackState::Idle, |s| s.state)
  }

  pub fn item(&self) -> Option<&VideoItem> {
    self.session.as_ref().map(|s| &s.item)
  }

  pub fn error(&self) -> Option<&str> {
    self.session.as_ref().and_then(|s| s.error.as_deref())
  }

  pub fn position(&self) -> f64 {
    self.session.as_ref().map_or(0.0, |s| s.position)
  }

  pub fn duration(&self) -> f64 {
    self.session.as_ref().map_or(0.0, |s| s.duration)
  }

  pub fn volume(&self) -> f64 {
    self.session.as_ref().map_or(self.volume, |s| s.volume)
  }

  pub fn is_muted(&self) -> bool {
    self.session.as_ref().map_or(self.muted, |s| s.muted)
  }

  pub fn rate(&self) -> f64 {
    self.session.as_ref().map_or(self.rate, |s| s.rate)
  }

  pub fn captions(&self) -> bool {
    self.session.as_ref().map_or(self.captions, |s| s.captions)
  }

  pub fn is_fullscreen(&self) -> bool {
    self.session.as_ref().is_some_and(|s| s.fullscreen)
  }

  pub fn is_pip(&self) -> bool {
    self.session.as_ref().is_some_and(|s| s.pip)
  }

  pub fn has_session(&self) -> bool {
    self.session.is_some()
  }

  // --- Session lifecycle ---

  /// Bind a result item: tear down any live session fully, then construct a
  /// new external player through the factory. The returned receiver carries
  /// this session's player events; the caller must drop the previous
  /// session's receiver before pumping this one.
  pub fn bind<F: PlayerFactory>(
    &mut self,
    item: VideoItem,
    factory: &F,
  ) -> Result<mpsc::UnboundedReceiver<PlayerEvent>> {
    // Previous session's handle and listeners go away before the new player
    // exists, so two external players never emit interleaved callbacks.
    self.close();

    let opts = PlayerOptions {
      autoplay: true,
      volume: self.volume,
      muted: self.muted,
      rate: self.rate,
      captions: self.captions,
    };
    info!(video_id = %item.id, title = %item.title, "binding playback session");
    let (handle, events) = factory.spawn(&item, &opts)?;

    self.session = Some(Session {
      item,
      handle,
      state: PlaybackState::Initializing,
      error: None,
      position: 0.0,
      duration: 0.0,
      volume: self.volume,
      muted: self.muted,
      last_nonzero_volume: if self.volume > 0.0 { self.volume } else { 1.0 },
      rate: self.rate,
      captions: self.captions,
      fullscreen: false,
      pip: false,
      pending: PendingCommands::default(),
      last_sample: None,
    });
    Ok(events)
  }

  /// Tear down the live session: release the player handle and return to
  /// `Idle`. Safe to call with no session.
  pub fn close(&mut self) {
    if let Some(mut session) = self.session.take() {
      info!(video_id = %session.item.id, "closing playback session");
      session.handle.shutdown();
    }
  }

  // --- Event dispatch ---

  /// The single transition function for all external player notifications.
  pub fn handle_event(&mut self, event: PlayerEvent) -> Option<Followup> {
    let session = self.session.as_mut()?;
    debug!(state = session.state.label(), event = ?event, "player event");
    match event {
      PlayerEvent::Ready { duration } => {
        session.duration = duration.max(0.0);
        session.state = PlaybackState::Ready;
        // Settings requested before readiness are applied now, not dropped.
        let pending = std::mem::take(&mut session.pending);
        if let Some(v) = pending.volume {
          session.handle.set_volume(v);
        }
        if let Some(m) = pending.muted {
          session.handle.set_muted(m);
        }
        if let Some(r) = pending.rate {
          session.handle.set_rate(r);
        }
        if let Some(c) = pending.captions {
          session.handle.set_captions(c);
        }
        if pending.play {
          session.handle.play();
        }
      }
      PlayerEvent::StateChange(external) => {
        if session.state == PlaybackState::Error {
          return None;
        }
        match external {
          ExternalState::Playing => session.state = PlaybackState::Playing,
          ExternalState::Paused => session.state = PlaybackState::Paused,
          // Buffering must not reset position or volume.
          ExternalState::Buffering => session.state = PlaybackState::Buffering,
          ExternalState::Ended => {
            session.state = PlaybackState::Ended;
            session.position = session.duration;
            if self.autoplay_next {
              return Some(Followup::AdvanceNext);
            }
          }
        }
      }
      PlayerEvent::Position(secs) => {
        // Sampling is gated on Playing; a reply that raced a pause or a
        // teardown is stale and dropped.
        if session.state == PlaybackState::Playing {
          let max = if session.duration > 0.0 { session.duration } else { f64::MAX };
          session.position = secs.max(0.0).min(max);
        }
      }
      PlayerEvent::RateChange(rate) => {
        session.rate = rate;
        self.rate = rate;
      }
      PlayerEvent::FullscreenChange(fullscreen) => {
        session.fullscreen = fullscreen;
        if fullscreen {
          session.pip = false;
        }
      }
      PlayerEvent::Capability(message) => {
        // The optimistic pip flag is the only one not driven by events.
        session.pip = false;
        return Some(Followup::Notice(message));
      }
      PlayerEvent::Error(message) => {
        warn!(video_id = %session.item.id, error = %message, "player runtime error");
        session.state = PlaybackState::Error;
        session.error = Some(message);
      }
    }
    None
  }

  // --- Commands (silent no-ops without a session) ---

  /// Toggle play/pause. Invoked while `Ended`, restarts from position zero.
  /// Before readiness the intent is queued, not dropped.
  pub fn toggle_play_pause(&mut self) {
    let Some(session) = self.session.as_mut() else { return };
    match session.state {
      PlaybackState::Initializing => session.pending.play = !session.pending.play,
      PlaybackState::Ended => {
        session.handle.seek(0.0);
        session.position = 0.0;
        session.handle.play();
      }
      PlaybackState::Playing | PlaybackState::Buffering => session.handle.pause(),
      PlaybackState::Ready | PlaybackState::Paused => session.handle.play(),
      PlaybackState::Idle | PlaybackState::Error => {}
    }
  }

  /// Seek by a relative offset, clamped to `[0, duration]`.
  pub fn seek_relative(&mut self, offset: f64) {
    let Some(session) = self.session.as_mut() else { return };
    if session.duration <= 0.0 {
      return;
    }
    let target = (session.position + offset).clamp(0.0, session.duration);
    session.position = target;
    session.handle.seek(target);
  }

  /// Seek to an absolute position, clamped to `[0, duration]`.
  pub fn seek_to(&mut self, secs: f64) {
    let Some(session) = self.session.as_mut() else { return };
    if session.duration <= 0.0 {
      return;
    }
    let target = secs.clamp(0.0, session.duration);
    session.position = target;
    session.handle.seek(target);
  }

  /// Jump to a decile of the total duration (digit keys 0–9).
  pub fn seek_fraction(&mut self, tenths: u32) {
    let duration = self.duration();
    if duration > 0.0 {
      self.seek_to(duration * f64::from(tenths.min(9)) / 10.0);
    }
  }

  /// Set volume in `0.0..=1.0`. Exactly zero implies mute; an explicit
  /// non-zero value unmutes and is remembered so unmute can restore it.
  pub fn set_volume(&mut self, volume: f64) {
    let volume = volume.clamp(0.0, 1.0);
    let Some(session) = self.session.as_mut() else { return };
    session.volume = volume;
    self.volume = volume;
    if volume == 0.0 {
      session.muted = true;
      self.muted = true;
      self.forward_or_pend(|p| p.muted = Some(true), |h| h.set_muted(true));
    } else {
      session.last_nonzero_volume = volume;
      let was_muted = session.muted;
      session.muted = false;
      self.muted = false;
      if was_muted {
        self.forward_or_pend(|p| p.muted = Some(false), |h| h.set_muted(false));
      }
      self.forward_or_pend(|p| p.volume = Some(volume), |h| h.set_volume(volume));
    }
  }

  pub fn volume_step(&mut self, delta: f64) {
    let current = self.volume();
    self.set_volume(current + delta);
  }

  /// Toggle mute. Unmuting restores the last non-zero volume exactly.
  pub fn toggle_mute(&mut self) {
    let Some(session) = self.session.as_mut() else { return };
    if session.muted {
      let restore = if session.volume > 0.0 { session.volume } else { session.last_nonzero_volume };
      session.muted = false;
      session.volume = restore;
      self.muted = false;
      self.volume = restore;
      self.forward_or_pend(|p| p.muted = Some(false), |h| h.set_muted(false));
      self.forward_or_pend(|p| p.volume = Some(restore), |h| h.set_volume(restore));
    } else {
      session.muted = true;
      self.muted = true;
      self.forward_or_pend(|p| p.muted = Some(true), |h| h.set_muted(true));
    }
  }

  /// Step to the next (or previous) rate in the fixed discrete set. The
  /// chosen rate is carried over and reapplied if the session is re-bound.
  pub fn cycle_rate(&mut self, forward: bool) {
    let current = self.rate();
    let idx = RATES.iter().position(|r| (r - current).abs() < f64::EPSILON).unwrap_or(2);
    let next = if forward { (idx + 1).min(RATES.len() - 1) } else { idx.saturating_sub(1) };
    let rate = RATES[next];
    if let Some(session) = self.session.as_mut() {
      session.rate = rate;
    }
    self.rate = rate;
    self.forward_or_pend(|p| p.rate = Some(rate), |h| h.set_rate(rate));
  }

  pub fn toggle_captions(&mut self) {
    let Some(session) = self.session.as_mut() else { return };
    session.captions = !session.captions;
    let visible = session.captions;
    self.captions = visible;
    self.forward_or_pend(|p| p.captions = Some(visible), |h| h.set_captions(visible));
  }

  /// Ask the player window to enter or leave fullscreen. The flag is not
  /// flipped here; it tracks [`PlayerEvent::FullscreenChange`], so exits the
  /// user triggers in the player window itself stay reconciled too.
  pub fn toggle_fullscreen(&mut self) {
    let Some(session) = self.session.as_ref() else { return };
    if session.state == PlaybackState::Initializing {
      return;
    }
    session.handle.set_fullscreen(!session.fullscreen);
  }

  /// Best-effort picture-in-picture. The flag flips optimistically; if the
  /// platform cannot do it, a [`PlayerEvent::Capability`] notice reverts it.
  pub fn toggle_pip(&mut self) {
    let Some(session) = self.session.as_mut() else { return };
    if session.state == PlaybackState::Initializing {
      return;
    }
    session.pip = !session.pip;
    session.handle.set_pip(session.pip);
  }

  /// Sample the external player's position, at most once per poll interval
  /// and only while `Playing`. Leaving `Playing` stops sampling immediately.
  pub fn sample_position(&mut self, now: Instant) {
    let Some(session) = self.session.as_mut() else { return };
    if session.state != PlaybackState::Playing {
      return;
    }
    let due = session
      .last_sample
      .is_none_or(|t| now.duration_since(t).as_millis() as u64 >= constants().position_poll_ms);
    if due {
      session.last_sample = Some(now);
      session.handle.request_position();
    }
  }

  /// Route a command to the live handle, or queue it if the player has not
  /// reported ready yet.
  fn forward_or_pend(
    &mut self,
    pend: impl FnOnce(&mut PendingCommands),
    forward: impl FnOnce(&dyn PlayerHandle),
  ) {
    let Some(session) = self.session.as_mut() else { return };
    if session.state == PlaybackState::Initializing {
      pend(&mut session.pending);
    } else {
      forward(session.handle.as_ref());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Debug, Clone, PartialEq)]
  enum Cmd {
    Play,
    Pause,
    Seek(f64),
    Volume(f64),
    Muted(bool),
    Rate(f64),
    Captions(bool),
    Fullscreen(bool),
    Pip(bool),
    RequestPosition,
    Shutdown,
  }

  #[derive(Clone, Default)]
  struct Recorder(Arc<Mutex<Vec<Cmd>>>);

  impl Recorder {
    fn commands(&self) -> Vec<Cmd> {
      self.0.lock().unwrap().clone()
    }

    fn clear(&self) {
      self.0.lock().unwrap().clear();
    }
  }

  struct MockHandle(Recorder);

  impl PlayerHandle for MockHandle {
    fn play(&self) {
      self.0.0.lock().unwrap().push(Cmd::Play);
    }
    fn pause(&self) {
      self.0.0.lock().unwrap().push(Cmd::Pause);
    }
    fn seek(&self, secs: f64) {
      self.0.0.lock().unwrap().push(Cmd::Seek(secs));
    }
    fn set_volume(&self, volume: f64) {
      self.0.0.lock().unwrap().push(Cmd::Volume(volume));
    }
    fn set_muted(&self, muted: bool) {
      self.0.0.lock().unwrap().push(Cmd::Muted(muted));
    }
    fn set_rate(&self, rate: f64) {
      self.0.0.lock().unwrap().push(Cmd::Rate(rate));
    }
    fn set_captions(&self, visible: bool) {
      self.0.0.lock().unwrap().push(Cmd::Captions(visible));
    }
    fn set_fullscreen(&self, fullscreen: bool) {
      self.0.0.lock().unwrap().push(Cmd::Fullscreen(fullscreen));
    }
    fn set_pip(&self, pip: bool) {
      self.0.0.lock().unwrap().push(Cmd::Pip(pip));
    }
    fn request_position(&self) {
      self.0.0.lock().unwrap().push(Cmd::RequestPosition);
    }
    fn shutdown(&mut self) {
      self.0.0.lock().unwrap().push(Cmd::Shutdown);
    }
  }

  struct MockFactory {
    recorder: Recorder,
    spawned: Arc<Mutex<u32>>,
  }

  impl MockFactory {
    fn new() -> Self {
      Self { recorder: Recorder::default(), spawned: Arc::new(Mutex::new(0)) }
    }

    fn spawn_count(&self) -> u32 {
      *self.spawned.lock().unwrap()
    }
  }

  impl PlayerFactory for MockFactory {
    fn spawn(
      &self,
      _item: &VideoItem,
      _opts: &PlayerOptions,
    ) -> Result<(Box<dyn PlayerHandle>, mpsc::UnboundedReceiver<PlayerEvent>)> {
      *self.spawned.lock().unwrap() += 1;
      let (_tx, rx) = mpsc::unbounded_channel();
      Ok((Box::new(MockHandle(self.recorder.clone())), rx))
    }
  }

  fn item(id: &str) -> VideoItem {
    VideoItem {
      id: id.to_string(),
      channel_id: "UC1".to_string(),
      channel_title: "chan".to_string(),
      title: "t".to_string(),
      description: String::new(),
      thumbnail: String::new(),
      duration: "4:13".to_string(),
      duration_secs: 253,
      views: "0".to_string(),
      likes: "0".to_string(),
      comments: "0".to_string(),
      published_at: None,
      published: String::new(),
    }
  }

  fn controller() -> PlaybackController {
    PlaybackController::new(0.8, 1.0, false, false)
  }

  #[test]
  fn idle_commands_are_silent_noops() {
    let mut c = controller();
    c.toggle_play_pause();
    c.seek_relative(10.0);
    c.toggle_mute();
    c.cycle_rate(true);
    assert_eq!(c.state(), PlaybackState::Idle);
  }

  #[test]
  fn bind_initializes_and_ready_captures_duration() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    assert_eq!(c.state(), PlaybackState::Initializing);
    assert_eq!(factory.spawn_count(), 1);

    c.handle_event(PlayerEvent::Ready { duration: 253.0 });
    assert_eq!(c.state(), PlaybackState::Ready);
    assert_eq!(c.duration(), 253.0);
  }

  #[test]
  fn play_before_ready_is_not_lost() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.toggle_play_pause();
    assert!(factory.recorder.commands().is_empty());

    c.handle_event(PlayerEvent::Ready { duration: 100.0 });
    assert!(factory.recorder.commands().contains(&Cmd::Play));
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    assert_eq!(c.state(), PlaybackState::Playing);
  }

  #[test]
  fn pre_ready_settings_applied_at_ready() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.set_volume(0.5);
    c.cycle_rate(true);
    c.toggle_captions();
    assert!(factory.recorder.commands().is_empty());

    c.handle_event(PlayerEvent::Ready { duration: 100.0 });
    let cmds = factory.recorder.commands();
    assert!(cmds.contains(&Cmd::Volume(0.5)));
    assert!(cmds.contains(&Cmd::Rate(1.25)));
    assert!(cmds.contains(&Cmd::Captions(true)));
  }

  #[test]
  fn mute_toggle_twice_restores_volume_exactly() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 100.0 });

    c.set_volume(0.63);
    assert!(!c.is_muted());
    c.toggle_mute();
    assert!(c.is_muted());
    c.toggle_mute();
    assert!(!c.is_muted());
    assert_eq!(c.volume(), 0.63);
  }

  #[test]
  fn volume_zero_implies_mute_and_unmute_restores_last_nonzero() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 100.0 });

    c.set_volume(0.4);
    c.set_volume(0.0);
    assert!(c.is_muted());
    c.toggle_mute();
    assert!(!c.is_muted());
    assert_eq!(c.volume(), 0.4);
  }

  #[test]
  fn volume_up_while_muted_unmutes() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 100.0 });

    c.set_volume(0.0);
    assert!(c.is_muted());
    factory.recorder.clear();

    // Stepping the volume back up must be audible, not a silent percentage.
    c.volume_step(0.05);
    assert!(!c.is_muted());
    assert!((c.volume() - 0.05).abs() < 1e-9);
    let cmds = factory.recorder.commands();
    assert!(cmds.contains(&Cmd::Muted(false)));
    assert!(cmds.iter().any(|c| matches!(c, Cmd::Volume(v) if (v - 0.05).abs() < 1e-9)));
  }

  #[test]
  fn seeks_clamped_to_duration() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    c.handle_event(PlayerEvent::Position(50.0));

    c.seek_relative(30.0);
    assert_eq!(c.position(), 60.0);
    c.seek_relative(-120.0);
    assert_eq!(c.position(), 0.0);
    c.seek_to(45.0);
    assert_eq!(c.position(), 45.0);
    c.seek_fraction(5);
    assert_eq!(c.position(), 30.0);
  }

  #[test]
  fn buffering_preserves_position() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    c.handle_event(PlayerEvent::Position(20.0));

    c.handle_event(PlayerEvent::StateChange(ExternalState::Buffering));
    assert_eq!(c.state(), PlaybackState::Buffering);
    assert_eq!(c.position(), 20.0);
  }

  #[test]
  fn stale_position_after_pause_is_dropped() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    c.handle_event(PlayerEvent::Position(10.0));
    c.handle_event(PlayerEvent::StateChange(ExternalState::Paused));

    // A sample that raced the pause arrives late.
    c.handle_event(PlayerEvent::Position(11.0));
    assert_eq!(c.position(), 10.0);
  }

  #[test]
  fn position_sampling_gated_on_playing_and_interval() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });

    let t0 = Instant::now();
    c.sample_position(t0);
    assert!(!factory.recorder.commands().contains(&Cmd::RequestPosition));

    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    c.sample_position(t0);
    assert_eq!(factory.recorder.commands().iter().filter(|c| **c == Cmd::RequestPosition).count(), 1);
    // Within the interval: no second request.
    c.sample_position(t0 + std::time::Duration::from_millis(10));
    assert_eq!(factory.recorder.commands().iter().filter(|c| **c == Cmd::RequestPosition).count(), 1);
    c.sample_position(t0 + std::time::Duration::from_millis(constants().position_poll_ms + 1));
    assert_eq!(factory.recorder.commands().iter().filter(|c| **c == Cmd::RequestPosition).count(), 2);
  }

  #[test]
  fn close_shuts_down_and_stops_sampling() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));

    c.close();
    assert_eq!(c.state(), PlaybackState::Idle);
    assert!(factory.recorder.commands().contains(&Cmd::Shutdown));

    factory.recorder.clear();
    c.sample_position(Instant::now());
    c.toggle_play_pause();
    assert!(factory.recorder.commands().is_empty());
  }

  #[test]
  fn rebind_tears_down_previous_session_first() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx1 = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });

    let _rx2 = c.bind(item("v2"), &factory).unwrap();
    assert_eq!(factory.spawn_count(), 2);
    // The first handle was shut down before the second spawn.
    assert_eq!(factory.recorder.commands(), vec![Cmd::Shutdown]);
    assert_eq!(c.item().unwrap().id, "v2");
    assert_eq!(c.state(), PlaybackState::Initializing);
  }

  #[test]
  fn ended_restarts_from_zero_on_toggle() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Ended));
    assert_eq!(c.state(), PlaybackState::Ended);
    assert_eq!(c.position(), 60.0);

    factory.recorder.clear();
    c.toggle_play_pause();
    assert_eq!(factory.recorder.commands(), vec![Cmd::Seek(0.0), Cmd::Play]);
    assert_eq!(c.position(), 0.0);
  }

  #[test]
  fn ended_with_autoplay_requests_advance() {
    let mut c = PlaybackController::new(0.8, 1.0, false, true);
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });

    let followup = c.handle_event(PlayerEvent::StateChange(ExternalState::Ended));
    assert_eq!(followup, Some(Followup::AdvanceNext));
  }

  #[test]
  fn error_is_terminal_for_state_changes() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::Error("demuxer failed".to_string()));
    assert_eq!(c.state(), PlaybackState::Error);
    assert_eq!(c.error(), Some("demuxer failed"));

    // Late state changes do not resurrect the session.
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));
    assert_eq!(c.state(), PlaybackState::Error);
    // And sampling stays off.
    c.sample_position(Instant::now());
    assert!(!factory.recorder.commands().contains(&Cmd::RequestPosition));
  }

  #[test]
  fn rate_carried_across_rebind() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.cycle_rate(true);
    c.cycle_rate(true);
    assert_eq!(c.rate(), 1.5);

    let _rx2 = c.bind(item("v2"), &factory).unwrap();
    assert_eq!(c.rate(), 1.5);
    factory.recorder.clear();
    c.handle_event(PlayerEvent::Ready { duration: 30.0 });
    // Factory opts already carry the rate; pending set is empty, nothing lost.
    assert_eq!(c.state(), PlaybackState::Ready);
  }

  #[test]
  fn external_rate_change_reconciled() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::RateChange(2.0));
    assert_eq!(c.rate(), 2.0);
  }

  #[test]
  fn fullscreen_flag_follows_player_events_not_requests() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });

    c.toggle_fullscreen();
    assert!(factory.recorder.commands().contains(&Cmd::Fullscreen(true)));
    // Not fullscreen until the player confirms.
    assert!(!c.is_fullscreen());
    c.handle_event(PlayerEvent::FullscreenChange(true));
    assert!(c.is_fullscreen());

    // The user leaves fullscreen in the player window itself.
    c.handle_event(PlayerEvent::FullscreenChange(false));
    assert!(!c.is_fullscreen());
  }

  #[test]
  fn pip_capability_failure_is_nonfatal() {
    let mut c = controller();
    let factory = MockFactory::new();
    let _rx = c.bind(item("v1"), &factory).unwrap();
    c.handle_event(PlayerEvent::Ready { duration: 60.0 });
    c.handle_event(PlayerEvent::StateChange(ExternalState::Playing));

    c.toggle_pip();
    assert!(c.is_pip());
    assert!(factory.recorder.commands().contains(&Cmd::Pip(true)));

    let followup =
      c.handle_event(PlayerEvent::Capability("picture-in-picture unavailable".to_string()));
    assert_eq!(followup, Some(Followup::Notice("picture-in-picture unavailable".to_string())));
    assert!(!c.is_pip());
    // Playback itself is unaffected.
    assert_eq!(c.state(), PlaybackState::Playing);
  }
}
