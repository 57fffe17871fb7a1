//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available —
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Search
  pub page_size: u32,
  pub debounce_ms: u64,
  pub history_max: usize,
  pub search_url: String,
  pub videos_url: String,
  pub default_query: String,

  // Playback
  pub position_poll_ms: u64,
  pub seek_step_small: f64,
  pub seek_step_large: f64,
  pub ipc_connect_attempts: u32,
  pub ipc_connect_delay_ms: u64,

  // UI
  pub error_dismiss_secs: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
