//! Bounded, persisted search-query history.
//!
//! Most-recent-first, at most `history_max` entries, case-insensitive
//! de-duplication: recording an existing query moves it to the front instead
//! of duplicating it. Persisted as TOML in the platform data dir so it
//! survives restarts; load and save never fail the app.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::constants;

#[derive(Serialize, Deserialize, Default, Debug)]
struct HistoryFile {
  entries: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SearchHistory {
  entries: Vec<String>,
}

impl SearchHistory {
  /// Restore persisted history, empty on first run or unreadable file.
  pub fn load() -> Self {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "tubedeck") {
      let path = proj_dirs.data_dir().join("history.toml");
      if let Ok(content) = std::fs::read_to_string(path)
        && let Ok(file) = toml::from_str::<HistoryFile>(&content)
      {
        let mut history = Self { entries: file.entries };
        history.entries.truncate(constants().history_max);
        return history;
      }
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "tubedeck") {
      let data_dir = proj_dirs.data_dir();
      if std::fs::create_dir_all(data_dir).is_ok()
        && let Ok(content) = toml::to_string(&HistoryFile { entries: self.entries.clone() })
      {
        let _ = std::fs::write(data_dir.join("history.toml"), content);
      }
    }
  }

  /// Record a query at the front. An existing entry (case-insensitive match
  /// on the trimmed string) is moved to the front rather than duplicated;
  /// the list is truncated to the bound afterwards.
  pub fn record(&mut self, query: &str) {
    let query = query.trim();
    if query.is_empty() {
      return;
    }
    let lower = query.to_lowercase();
    self.entries.retain(|e| e.to_lowercase() != lower);
    self.entries.insert(0, query.to_string());
    self.entries.truncate(constants().history_max);
  }

  pub fn entries(&self) -> &[String] {
    &self.entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_is_most_recent_first() {
    let mut h = SearchHistory::default();
    h.record("rust");
    h.record("tokio");
    assert_eq!(h.entries(), &["tokio".to_string(), "rust".to_string()]);
  }

  #[test]
  fn duplicate_moves_to_front_case_insensitive() {
    let mut h = SearchHistory::default();
    h.record("Rust Async");
    h.record("tokio");
    h.record("rust async");
    assert_eq!(h.entries(), &["rust async".to_string(), "tokio".to_string()]);
  }

  #[test]
  fn bounded_at_history_max() {
    let mut h = SearchHistory::default();
    for i in 0..11 {
      h.record(&format!("query {}", i));
    }
    assert_eq!(h.entries().len(), constants().history_max);
    assert_eq!(h.entries()[0], "query 10");
    // The oldest entry fell off.
    assert!(!h.entries().iter().any(|e| e == "query 0"));
  }

  #[test]
  fn whitespace_trimmed_before_recording() {
    let mut h = SearchHistory::default();
    h.record("  rust  ");
    assert_eq!(h.entries(), &["rust".to_string()]);
    h.record("rust");
    assert_eq!(h.entries().len(), 1);
  }

  #[test]
  fn empty_query_ignored() {
    let mut h = SearchHistory::default();
    h.record("   ");
    assert!(h.entries().is_empty());
  }
}
