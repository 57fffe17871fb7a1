use ratatui::widgets::ListState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{DurationBucket, ResultPage, SortOrder, YouTubeApi};
use crate::config::Config;
use crate::constants::constants;
use crate::history::SearchHistory;
use crate::mpv::MpvFactory;
use crate::playback::{Followup, PlaybackController, PlayerEvent};
use crate::search::{Applied, FetchKind, FetchSpec, SearchController};

// --- Types ---

pub type FetchOutcome = (FetchSpec, Result<ResultPage, String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
  Filters,
  Player,
}

/// Filter controls selectable in `AppMode::Filters`, left to right.
pub const FILTER_SLOTS: usize = 4;

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub search: SearchController,
  pub playback: PlaybackController,
  pub list_state: ListState,
  /// Highlighted filter control in `AppMode::Filters`.
  pub filter_slot: usize,
  /// Position while cycling through saved queries with Up in input mode.
  pub history_pos: Option<usize>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  api: Arc<YouTubeApi>,
  factory: MpvFactory,
  fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
  fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
  player_rx: Option<mpsc::UnboundedReceiver<PlayerEvent>>,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(api_key: String, autoplay_next: bool) -> Self {
    let config = Config::load();
    let playback = PlaybackController::new(
      config.volume.unwrap_or(1.0),
      config.rate.unwrap_or(1.0),
      config.captions.unwrap_or(false),
      autoplay_next || config.autoplay_next.unwrap_or(false),
    );

    let default_input = constants().default_query.clone();
    let default_cursor = default_input.chars().count();
    let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

    Self {
      input: default_input,
      cursor_position: default_cursor,
      input_scroll: 0,
      mode: AppMode::Input,
      search: SearchController::new(SearchHistory::load()),
      playback,
      list_state: ListState::default(),
      filter_slot: 0,
      history_pos: None,
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      api: Arc::new(YouTubeApi::new(api_key)),
      factory: MpvFactory,
      fetch_tx,
      fetch_rx,
      player_rx: None,
      error_time: None,
    }
  }

  // --- Messages ---

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after the dismiss interval.
  pub fn expire_error(&mut self, now: Instant) {
    if let Some(t) = self.error_time
      && now.duration_since(t) >= Duration::from_secs(constants().error_dismiss_secs)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  pub fn save_config(&self) {
    let config = Config {
      autoplay_next: Some(self.playback.autoplay_next),
      volume: Some(self.playback.volume()),
      rate: Some(self.playback.rate()),
      captions: Some(self.playback.captions()),
    };
    config.save();
  }

  // --- Search plumbing ---

  /// Spawn the network call described by a fetch spec. Completion lands on
  /// the fetch channel and is routed back through the search controller, so
  /// superseded requests are discarded there rather than cancelled here.
  fn spawn_fetch(&self, spec: FetchSpec) {
    let api = Arc::clone(&self.api);
    let tx = self.fetch_tx.clone();
    tokio::spawn(async move {
      let result = api
        .search_page(&spec.query, &spec.filters, spec.page_token.as_deref())
        .await
        .map_err(|e| match spec.kind {
          FetchKind::Fresh => format!("Search failed: {:#}", e),
          FetchKind::More | FetchKind::Previous => format!("Failed to load page: {:#}", e),
        });
      let _ = tx.send((spec, result));
    });
  }

  fn issue(&mut self, spec: Option<FetchSpec>) {
    if let Some(spec) = spec {
      self.spawn_fetch(spec);
    }
  }

  pub fn trigger_search(&mut self) {
    self.history_pos = None;
    let text = self.input.clone();
    if let Some(spec) = self.search.search(&text) {
      self.clear_error();
      self.status_message = Some(format!("Searching '{}'…", spec.query));
      self.spawn_fetch(spec);
    }
  }

  /// Called after every edit of the input text; re-arms the quiet interval.
  pub fn input_edited(&mut self) {
    self.history_pos = None;
    let text = self.input.clone();
    self.search.schedule_debounced(&text, Instant::now());
  }

  /// Fire a pending debounced search if its deadline passed.
  pub fn tick_search(&mut self, now: Instant) {
    if let Some(spec) = self.search.tick(now) {
      self.status_message = Some(format!("Searching '{}'…", spec.query));
      self.spawn_fetch(spec);
    }
  }

  pub fn trigger_load_more(&mut self) {
    let spec = self.search.load_more();
    self.issue(spec);
  }

  pub fn trigger_load_previous(&mut self) {
    let spec = self.search.load_previous();
    self.issue(spec);
  }

  pub fn retry_search(&mut self) {
    let spec = self.search.retry();
    self.issue(spec);
  }

  /// Cycle the value of one filter control. Any actual change re-issues the
  /// current search immediately; the debounce path is for typing only.
  pub fn cycle_filter(&mut self, slot: usize, forward: bool) {
    let mut filters = self.search.filters();
    match slot {
      0 => filters.sort = cycle(&SortOrder::ALL, filters.sort, forward),
      1 => filters.duration = cycle(&DurationBucket::ALL, filters.duration, forward),
      2 => filters.hd = !filters.hd,
      3 => filters.captions = !filters.captions,
      _ => return,
    }
    let spec = self.search.update_filters(filters);
    if spec.is_some() {
      self.status_message = Some("Applying filters…".to_string());
    }
    self.issue(spec);
  }

  /// Fill the input from saved queries, oldest-ward on each press.
  pub fn recall_history(&mut self) {
    let entries = self.search.history().entries();
    if entries.is_empty() {
      return;
    }
    let next = self.history_pos.map_or(0, |i| (i + 1).min(entries.len() - 1));
    self.input = entries[next].clone();
    self.cursor_position = self.input.chars().count();
    self.input_scroll = 0;
    self.history_pos = Some(next);
    // Recalled text is an explicit choice, not typing; no debounce.
    self.search.schedule_debounced("", Instant::now());
  }

  // --- Playback plumbing ---

  pub fn play_selected(&mut self) {
    let Some(selected) = self.list_state.selected() else { return };
    let Some(item) = self.search.items().get(selected) else { return };
    let item = item.clone();
    self.clear_error();
    match self.playback.bind(item, &self.factory) {
      Ok(rx) => {
        self.player_rx = Some(rx);
        self.mode = AppMode::Player;
      }
      Err(e) => self.set_error(format!("Playback error: {:#}", e)),
    }
  }

  pub fn stop_playback(&mut self) {
    self.playback.close();
    self.player_rx = None;
    if self.mode == AppMode::Player {
      self.mode = AppMode::Results;
    }
  }

  /// Move the selection by `delta` within the current list and play it.
  /// Stepping past the end with more pages available fetches the next page
  /// instead; playback stays where it is until the user selects again.
  pub fn play_offset(&mut self, delta: i64) {
    let count = self.search.items().len();
    if count == 0 {
      return;
    }
    let current = self.list_state.selected().unwrap_or(0) as i64;
    let target = current + delta;
    if target < 0 {
      return;
    }
    if target as usize >= count {
      if self.search.has_next_page() {
        self.trigger_load_more();
      }
      return;
    }
    self.list_state.select(Some(target as usize));
    self.play_selected();
  }

  pub fn sample_position(&mut self, now: Instant) {
    self.playback.sample_position(now);
  }

  // --- Pending results ---

  pub fn check_pending(&mut self) {
    while let Ok((spec, result)) = self.fetch_rx.try_recv() {
      self.status_message = None;
      match self.search.apply(&spec, result) {
        Applied::Replaced { count } => {
          // The controller records history in memory; persisting it is ours.
          self.search.history().save();
          if count == 0 {
            self.set_error("No results found.".to_string());
            self.list_state.select(None);
          } else {
            self.clear_error();
            self.list_state.select(Some(0));
          }
        }
        Applied::Prepended { count } => {
          // Keep the same item highlighted after the prepend.
          if let Some(i) = self.list_state.selected() {
            self.list_state.select(Some(i + count));
          }
        }
        Applied::Appended { .. } | Applied::Stale => {}
        Applied::Failed => {
          warn!("search fetch failed");
          self.list_state.select(None);
        }
      }
    }

    let mut advance = false;
    let mut notices = Vec::new();
    if let Some(ref mut rx) = self.player_rx {
      while let Ok(event) = rx.try_recv() {
        match self.playback.handle_event(event) {
          Some(Followup::AdvanceNext) => advance = true,
          Some(Followup::Notice(msg)) => notices.push(msg),
          None => {}
        }
      }
    }
    for msg in notices {
      self.info_message = Some(msg);
    }
    if advance {
      info!("autoplay: advancing to next result");
      self.play_offset(1);
    }
  }
}

/// Step through a fixed variant list, saturating at the ends.
fn cycle<T: Copy + PartialEq>(all: &[T], current: T, forward: bool) -> T {
  let idx = all.iter().position(|v| *v == current).unwrap_or(0);
  let next = if forward { (idx + 1) % all.len() } else { (idx + all.len() - 1) % all.len() };
  all[next]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_auto_dismisses_after_interval() {
    let mut app = App::new("key".to_string(), false);
    app.set_error("boom".to_string());
    let t = Instant::now();

    app.expire_error(t + Duration::from_secs(1));
    assert_eq!(app.last_error.as_deref(), Some("boom"));

    app.expire_error(t + Duration::from_secs(constants().error_dismiss_secs) + Duration::from_millis(1));
    assert!(app.last_error.is_none());
    // Expiry also clears the timer; a later tick stays quiet.
    app.expire_error(t + Duration::from_secs(60));
    assert!(app.last_error.is_none());
  }

  #[test]
  fn cycle_wraps_both_ways() {
    assert_eq!(cycle(&SortOrder::ALL, SortOrder::Relevance, true), SortOrder::Date);
    assert_eq!(cycle(&SortOrder::ALL, SortOrder::Relevance, false), *SortOrder::ALL.last().unwrap());
    let last = *DurationBucket::ALL.last().unwrap();
    assert_eq!(cycle(&DurationBucket::ALL, last, true), DurationBucket::ALL[0]);
  }
}
