//! mpv-backed implementation of the external player seam.
//!
//! One mpv process per session, driven over its JSON IPC socket. The factory
//! returns immediately; an I/O task connects to the socket with retry,
//! registers property observers and translates mpv's notifications into
//! [`PlayerEvent`]s. Commands from the handle are fire-and-forget JSON lines
//! funneled through the same task, so the handle itself stays synchronous
//! and object-safe.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
  net::UnixStream,
  process::{Child, Command},
  sync::mpsc,
  time::{Duration, sleep},
};
use tracing::{debug, info, warn};

use crate::api::VideoItem;
use crate::constants::constants;
use crate::playback::{ExternalState, PlayerEvent, PlayerFactory, PlayerHandle, PlayerOptions};

/// Property observer ids registered after connecting.
const OBS_PAUSE: u64 = 1;
const OBS_CACHE: u64 = 2;
const OBS_DURATION: u64 = 3;
const OBS_EOF: u64 = 4;
const OBS_SPEED: u64 = 5;
const OBS_FULLSCREEN: u64 = 6;
/// Request id for position samples.
const REQ_POSITION: u64 = 7;
/// Request ids for window feature requests, so their error replies can be
/// told apart from ordinary command acknowledgements.
const REQ_FULLSCREEN: u64 = 8;
const REQ_PIP: u64 = 9;

enum IpcCommand {
  Raw(String),
  Shutdown,
}

pub struct MpvFactory;

impl PlayerFactory for MpvFactory {
  fn spawn(
    &self,
    item: &VideoItem,
    opts: &PlayerOptions,
  ) -> Result<(Box<dyn PlayerHandle>, mpsc::UnboundedReceiver<PlayerEvent>)> {
    let socket_path = std::env::temp_dir().join(format!("tubedeck-mpv-{}-{}.sock", std::process::id(), item.id));
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let url = format!("https://www.youtube.com/watch?v={}", item.id);
    let mut cmd = Command::new("mpv");
    cmd.args([
      // keep-open so EOF lands in an ended state instead of exiting mpv
      "--keep-open=yes",
      "--no-terminal",
      &format!("--pause={}", if opts.autoplay { "no" } else { "yes" }),
      &format!("--volume={:.0}", opts.volume.clamp(0.0, 1.0) * 100.0),
      &format!("--mute={}", if opts.muted { "yes" } else { "no" }),
      &format!("--speed={}", opts.rate),
      &format!("--sub-visibility={}", if opts.captions { "yes" } else { "no" }),
      &format!("--input-ipc-server={}", socket_path.display()),
      "--",
      &url,
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    info!(video_id = %item.id, socket = %socket_path.display(), "spawned mpv");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(ipc_task(socket_path, child, cmd_rx, event_tx));

    Ok((Box::new(MpvHandle { commands: cmd_tx }), event_rx))
  }
}

pub struct MpvHandle {
  commands: mpsc::UnboundedSender<IpcCommand>,
}

impl MpvHandle {
  fn send(&self, frame: Value) {
    let _ = self.commands.send(IpcCommand::Raw(frame.to_string()));
  }
}

impl PlayerHandle for MpvHandle {
  fn play(&self) {
    self.send(json!({"command": ["set_property", "pause", false]}));
  }

  fn pause(&self) {
    self.send(json!({"command": ["set_property", "pause", true]}));
  }

  fn seek(&self, secs: f64) {
    self.send(json!({"command": ["seek", secs, "absolute"]}));
  }

  fn set_volume(&self, volume: f64) {
    self.send(json!({"command": ["set_property", "volume", volume.clamp(0.0, 1.0) * 100.0]}));
  }

  fn set_muted(&self, muted: bool) {
    self.send(json!({"command": ["set_property", "mute", muted]}));
  }

  fn set_rate(&self, rate: f64) {
    self.send(json!({"command": ["set_property", "speed", rate]}));
  }

  fn set_captions(&self, visible: bool) {
    self.send(json!({"command": ["set_property", "sub-visibility", visible]}));
  }

  fn set_fullscreen(&self, fullscreen: bool) {
    self.send(json!({"command": ["set_property", "fullscreen", fullscreen], "request_id": REQ_FULLSCREEN}));
  }

  fn set_pip(&self, pip: bool) {
    // mpv has no first-class picture-in-picture; a small always-on-top
    // window is the closest equivalent. Audio-only streams have no window
    // and reject these, which surfaces as a capability notice.
    self.send(json!({"command": ["set_property", "ontop", pip], "request_id": REQ_PIP}));
    let scale = if pip { 0.3 } else { 1.0 };
    self.send(json!({"command": ["set_property", "window-scale", scale], "request_id": REQ_PIP}));
  }

  fn request_position(&self) {
    self.send(json!({"command": ["get_property", "time-pos"], "request_id": REQ_POSITION}));
  }

  fn shutdown(&mut self) {
    let _ = self.commands.send(IpcCommand::Shutdown);
  }
}

/// Connect to the IPC socket with retry. mpv creates the socket only after
/// it finishes starting up, so the first attempts are expected to fail.
async fn connect_with_retry(path: &PathBuf) -> Result<UnixStream> {
  let c = constants();
  for attempt in 0..c.ipc_connect_attempts {
    match UnixStream::connect(path).await {
      Ok(stream) => {
        debug!(attempt, "connected to mpv IPC socket");
        return Ok(stream);
      }
      Err(_) => sleep(Duration::from_millis(c.ipc_connect_delay_ms)).await,
    }
  }
  Err(anyhow!("Timed out waiting for mpv IPC socket"))
}

/// Tracks enough mpv property state to synthesize coherent state changes.
#[derive(Default)]
struct IpcState {
  ready: bool,
  paused: bool,
  buffering: bool,
  ended: bool,
}

impl IpcState {
  /// The external state implied by the current property values.
  fn external(&self) -> ExternalState {
    if self.ended {
      ExternalState::Ended
    } else if self.buffering {
      ExternalState::Buffering
    } else if self.paused {
      ExternalState::Paused
    } else {
      ExternalState::Playing
    }
  }
}

async fn ipc_task(
  socket_path: PathBuf,
  mut child: Child,
  mut commands: mpsc::UnboundedReceiver<IpcCommand>,
  events: mpsc::UnboundedSender<PlayerEvent>,
) {
  let result = run_ipc(&socket_path, &mut commands, &events).await;
  if let Err(e) = result {
    // Surfacing through the event channel keeps error shapes out of the UI.
    let _ = events.send(PlayerEvent::Error(format!("{:#}", e)));
  }

  let _ = child.kill().await;
  let _ = child.wait().await;
  let _ = std::fs::remove_file(&socket_path);
  debug!("mpv IPC task finished");
}

async fn run_ipc(
  socket_path: &PathBuf,
  commands: &mut mpsc::UnboundedReceiver<IpcCommand>,
  events: &mpsc::UnboundedSender<PlayerEvent>,
) -> Result<()> {
  let stream = connect_with_retry(socket_path).await?;
  let (read_half, mut write_half) = stream.into_split();
  let mut lines = BufReader::new(read_half).lines();

  for (id, property) in [
    (OBS_PAUSE, "pause"),
    (OBS_CACHE, "paused-for-cache"),
    (OBS_DURATION, "duration"),
    (OBS_EOF, "eof-reached"),
    (OBS_SPEED, "speed"),
    (OBS_FULLSCREEN, "fullscreen"),
  ] {
    let frame = json!({"command": ["observe_property", id, property]}).to_string();
    write_half.write_all(frame.as_bytes()).await.context("Failed to register mpv property observer")?;
    write_half.write_all(b"\n").await.context("Failed to register mpv property observer")?;
  }

  let mut state = IpcState::default();

  loop {
    tokio::select! {
      line = lines.next_line() => {
        let Some(line) = line.context("Failed to read from mpv IPC socket")? else {
          if !state.ended {
            return Err(anyhow!("mpv exited unexpectedly"));
          }
          return Ok(());
        };
        let Ok(frame) = serde_json::from_str::<Value>(&line) else { continue };
        handle_frame(&frame, &mut state, events);
      }
      cmd = commands.recv() => {
        match cmd {
          Some(IpcCommand::Raw(frame)) => {
            write_half.write_all(frame.as_bytes()).await.context("Failed to send mpv command")?;
            write_half.write_all(b"\n").await.context("Failed to send mpv command")?;
          }
          // Controller teardown, or the handle was dropped: quit mpv.
          Some(IpcCommand::Shutdown) | None => {
            let _ = write_half.write_all(b"{\"command\":[\"quit\"]}\n").await;
            return Ok(());
          }
        }
      }
    }
  }
}

/// Translate one mpv IPC frame into player events.
fn handle_frame(frame: &Value, state: &mut IpcState, events: &mpsc::UnboundedSender<PlayerEvent>) {
  // Command replies carry our request ids; successful acknowledgements of
  // set_property commands are uninteresting.
  if let Some(request_id) = frame.get("request_id").and_then(Value::as_u64) {
    let failed = frame.get("error").and_then(Value::as_str).is_some_and(|e| e != "success");
    match request_id {
      REQ_POSITION => {
        if let Some(secs) = frame.get("data").and_then(Value::as_f64) {
          let _ = events.send(PlayerEvent::Position(secs));
        }
      }
      REQ_FULLSCREEN if failed => {
        let _ = events.send(PlayerEvent::Capability("Fullscreen is not available for this stream".to_string()));
      }
      REQ_PIP if failed => {
        let _ = events.send(PlayerEvent::Capability("Picture-in-picture is not available for this stream".to_string()));
      }
      _ => {}
    }
    return;
  }

  match frame.get("event").and_then(Value::as_str) {
    Some("property-change") => {
      let id = frame.get("id").and_then(Value::as_u64).unwrap_or(0);
      let data = frame.get("data");
      let before = state.external();
      match id {
        OBS_PAUSE => {
          if let Some(paused) = data.and_then(Value::as_bool) {
            state.paused = paused;
          }
        }
        OBS_CACHE => {
          if let Some(buffering) = data.and_then(Value::as_bool) {
            state.buffering = buffering;
          }
        }
        OBS_DURATION => {
          if let Some(duration) = data.and_then(Value::as_f64)
            && !state.ready
          {
            state.ready = true;
            let _ = events.send(PlayerEvent::Ready { duration });
            let _ = events.send(PlayerEvent::StateChange(state.external()));
            return;
          }
        }
        OBS_EOF => {
          if let Some(ended) = data.and_then(Value::as_bool) {
            state.ended = ended;
          }
        }
        OBS_SPEED => {
          // Externally triggered rate changes (e.g. mpv's own keybindings in
          // its window) are reconciled rather than ignored.
          if let Some(rate) = data.and_then(Value::as_f64) {
            let _ = events.send(PlayerEvent::RateChange(rate));
          }
        }
        OBS_FULLSCREEN => {
          // Covers both our requests and the user toggling fullscreen in the
          // player window itself.
          if let Some(fullscreen) = data.and_then(Value::as_bool) {
            let _ = events.send(PlayerEvent::FullscreenChange(fullscreen));
          }
        }
        _ => {}
      }
      // Property updates arrive before the duration is known; the controller
      // only sees state changes once the session is ready.
      if state.ready && state.external() != before {
        let _ = events.send(PlayerEvent::StateChange(state.external()));
      }
    }
    Some("end-file") => {
      let reason = frame.get("reason").and_then(Value::as_str).unwrap_or("");
      if reason == "error" {
        let detail = frame.get("file_error").and_then(Value::as_str).unwrap_or("playback failed");
        warn!(reason = %detail, "mpv end-file error");
        let _ = events.send(PlayerEvent::Error(format!("Playback failed: {}", detail)));
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drain(rx: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
      out.push(e);
    }
    out
  }

  #[test]
  fn duration_property_emits_ready_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState::default();

    let frame = json!({"event": "property-change", "id": OBS_DURATION, "name": "duration", "data": 253.4});
    handle_frame(&frame, &mut state, &tx);
    handle_frame(&frame, &mut state, &tx);

    let events = drain(&mut rx);
    let ready_count =
      events.iter().filter(|e| matches!(e, PlayerEvent::Ready { .. })).count();
    assert_eq!(ready_count, 1);
  }

  #[test]
  fn pause_changes_suppressed_until_ready() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState::default();

    let pause = json!({"event": "property-change", "id": OBS_PAUSE, "name": "pause", "data": true});
    handle_frame(&pause, &mut state, &tx);
    assert!(drain(&mut rx).is_empty());

    let duration = json!({"event": "property-change", "id": OBS_DURATION, "name": "duration", "data": 60.0});
    handle_frame(&duration, &mut state, &tx);
    let events = drain(&mut rx);
    assert!(matches!(events[0], PlayerEvent::Ready { .. }));
    assert!(matches!(events[1], PlayerEvent::StateChange(ExternalState::Paused)));
  }

  #[test]
  fn cache_stall_maps_to_buffering_and_back() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let stall = json!({"event": "property-change", "id": OBS_CACHE, "name": "paused-for-cache", "data": true});
    handle_frame(&stall, &mut state, &tx);
    let recover = json!({"event": "property-change", "id": OBS_CACHE, "name": "paused-for-cache", "data": false});
    handle_frame(&recover, &mut state, &tx);

    let events = drain(&mut rx);
    assert!(matches!(events[0], PlayerEvent::StateChange(ExternalState::Buffering)));
    assert!(matches!(events[1], PlayerEvent::StateChange(ExternalState::Playing)));
  }

  #[test]
  fn eof_maps_to_ended() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let eof = json!({"event": "property-change", "id": OBS_EOF, "name": "eof-reached", "data": true});
    handle_frame(&eof, &mut state, &tx);
    let events = drain(&mut rx);
    assert!(matches!(events[0], PlayerEvent::StateChange(ExternalState::Ended)));
  }

  #[test]
  fn position_reply_matched_by_request_id() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let reply = json!({"request_id": REQ_POSITION, "error": "success", "data": 42.5});
    handle_frame(&reply, &mut state, &tx);
    // Replies to other requests are ignored.
    let other = json!({"request_id": 99, "error": "success", "data": 1.0});
    handle_frame(&other, &mut state, &tx);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PlayerEvent::Position(p) if (p - 42.5).abs() < 1e-9));
  }

  #[test]
  fn fullscreen_property_change_forwarded() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let frame = json!({"event": "property-change", "id": OBS_FULLSCREEN, "name": "fullscreen", "data": true});
    handle_frame(&frame, &mut state, &tx);
    let events = drain(&mut rx);
    assert!(matches!(events[0], PlayerEvent::FullscreenChange(true)));
  }

  #[test]
  fn failed_pip_reply_becomes_capability_notice() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let reply = json!({"request_id": REQ_PIP, "error": "property not found"});
    handle_frame(&reply, &mut state, &tx);
    // A successful acknowledgement is silent.
    let ok = json!({"request_id": REQ_FULLSCREEN, "error": "success"});
    handle_frame(&ok, &mut state, &tx);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], PlayerEvent::Capability(msg) if msg.contains("Picture-in-picture")));
  }

  #[test]
  fn end_file_error_surfaces_as_player_error() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };

    let frame = json!({"event": "end-file", "reason": "error", "file_error": "no stream found"});
    handle_frame(&frame, &mut state, &tx);
    let events = drain(&mut rx);
    assert!(matches!(&events[0], PlayerEvent::Error(msg) if msg.contains("no stream found")));
  }

  #[test]
  fn unknown_frames_ignored() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = IpcState { ready: true, ..IpcState::default() };
    handle_frame(&json!({"event": "client-message"}), &mut state, &tx);
    handle_frame(&json!({"bogus": true}), &mut state, &tx);
    assert!(drain(&mut rx).is_empty());
  }
}
