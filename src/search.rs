//! Search controller: query text, filters, pagination and result merging.
//!
//! The controller is a synchronous state machine deliberately free of I/O.
//! It emits [`FetchSpec`] values describing the network call to issue; the
//! app spawns the actual request and feeds the outcome back through
//! [`SearchController::apply`]. Every issued fetch captures the value of a
//! monotonically increasing generation counter, and a result is applied only
//! if its captured generation still equals the current one — an in-flight
//! page superseded by a newer search is discarded on arrival.
//!
//! Debounce is an explicit deadline owned by the controller: arming a new
//! one replaces the old, so a superseded debounced search never fires.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::api::{ResultPage, SearchFilters};
use crate::constants::constants;
use crate::history::SearchHistory;

/// What a completed fetch did to the result list.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
  /// Result generation no longer current; nothing changed.
  Stale,
  /// Fresh page replaced the list.
  Replaced { count: usize },
  /// Next page appended.
  Appended { count: usize },
  /// Previous page prepended (selection should shift by `count`).
  Prepended { count: usize },
  /// Fetch failed; list cleared, error surfaced.
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
  Fresh,
  More,
  Previous,
}

/// A network call the controller wants issued. The page token is the
/// provider's opaque continuation string, round-tripped verbatim.
#[derive(Debug, Clone)]
pub struct FetchSpec {
  pub generation: u64,
  pub kind: FetchKind,
  pub query: String,
  pub filters: SearchFilters,
  pub page_token: Option<String>,
}

#[derive(Debug)]
struct PendingDebounce {
  text: String,
  deadline: Instant,
}

pub struct SearchController {
  filters: SearchFilters,
  items: Vec<crate::api::VideoItem>,
  next_token: Option<String>,
  prev_token: Option<String>,
  total_results: u64,
  error: Option<String>,
  loading: bool,
  generation: u64,
  /// Query of the most recent accepted fresh search.
  current_query: Option<String>,
  /// Last query recorded into history; filter-only re-searches skip the
  /// duplicate record.
  last_recorded: Option<String>,
  debounce: Option<PendingDebounce>,
  history: SearchHistory,
}

impl SearchController {
  pub fn new(history: SearchHistory) -> Self {
    Self {
      filters: SearchFilters::default(),
      items: Vec::new(),
      next_token: None,
      prev_token: None,
      total_results: 0,
      error: None,
      loading: false,
      generation: 0,
      current_query: None,
      last_recorded: None,
      debounce: None,
      history,
    }
  }

  // --- Accessors ---

  pub fn items(&self) -> &[crate::api::VideoItem] {
    &self.items
  }

  pub fn filters(&self) -> SearchFilters {
    self.filters
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn total_results(&self) -> u64 {
    self.total_results
  }

  pub fn has_next_page(&self) -> bool {
    self.next_token.is_some()
  }

  pub fn has_prev_page(&self) -> bool {
    self.prev_token.is_some()
  }

  pub fn current_query(&self) -> Option<&str> {
    self.current_query.as_deref()
  }

  pub fn history(&self) -> &SearchHistory {
    &self.history
  }

  // --- Operations ---

  /// Issue a fresh search. Empty or whitespace-only text is a quiet no-op:
  /// no network call and no user-visible error.
  pub fn search(&mut self, text: &str) -> Option<FetchSpec> {
    let query = text.trim();
    if query.is_empty() {
      return None;
    }
    self.debounce = None;
    self.generation += 1;
    self.loading = true;
    self.error = None;
    self.current_query = Some(query.to_string());
    info!(query = %query, generation = self.generation, "search issued");
    Some(FetchSpec {
      generation: self.generation,
      kind: FetchKind::Fresh,
      query: query.to_string(),
      filters: self.filters,
      page_token: None,
    })
  }

  /// Arm (or re-arm) the debounce deadline for text-input-driven searches.
  /// A newer keystroke replaces the pending one, so only the last of a burst
  /// ever fires. Text that trims empty disarms the timer entirely.
  pub fn schedule_debounced(&mut self, text: &str, now: Instant) {
    if text.trim().is_empty() {
      self.debounce = None;
      return;
    }
    let deadline = now + Duration::from_millis(constants().debounce_ms);
    self.debounce = Some(PendingDebounce { text: text.to_string(), deadline });
  }

  /// Fire the pending debounced search if its quiet interval has elapsed.
  pub fn tick(&mut self, now: Instant) -> Option<FetchSpec> {
    if self.debounce.as_ref().is_some_and(|d| now >= d.deadline) {
      let pending = self.debounce.take()?;
      return self.search(&pending.text);
    }
    None
  }

  /// Request the next page. No-op (never throws) without a continuation
  /// token from the last successful page.
  pub fn load_more(&mut self) -> Option<FetchSpec> {
    if self.loading {
      return None;
    }
    let token = self.next_token.clone()?;
    let query = self.current_query.clone()?;
    self.generation += 1;
    self.loading = true;
    debug!(generation = self.generation, "load more issued");
    Some(FetchSpec {
      generation: self.generation,
      kind: FetchKind::More,
      query,
      filters: self.filters,
      page_token: Some(token),
    })
  }

  /// Request the previous page, symmetric to [`Self::load_more`].
  pub fn load_previous(&mut self) -> Option<FetchSpec> {
    if self.loading {
      return None;
    }
    let token = self.prev_token.clone()?;
    let query = self.current_query.clone()?;
    self.generation += 1;
    self.loading = true;
    debug!(generation = self.generation, "load previous issued");
    Some(FetchSpec {
      generation: self.generation,
      kind: FetchKind::Previous,
      query,
      filters: self.filters,
      page_token: Some(token),
    })
  }

  /// Replace the active filter set wholesale. A value equal to the current
  /// filters is a no-op (no network call). Otherwise, if a query is active,
  /// an immediate fresh search is issued — pagination state is discarded,
  /// and debounce is bypassed (filter controls are discrete user actions).
  pub fn update_filters(&mut self, new_filters: SearchFilters) -> Option<FetchSpec> {
    if new_filters == self.filters {
      return None;
    }
    self.filters = new_filters;
    let query = self.current_query.clone()?;
    self.search(&query)
  }

  /// Manual retry: re-issue a fresh search with the last parameters.
  pub fn retry(&mut self) -> Option<FetchSpec> {
    let query = self.current_query.clone()?;
    self.search(&query)
  }

  /// Apply a completed fetch. Results whose generation was superseded by a
  /// newer operation are discarded untouched. Errors arrive already
  /// converted to display strings; a failure clears the visible list and
  /// leaves history untouched. History is recorded in memory only; writing
  /// it to disk is the caller's concern, keeping this controller I/O-free.
  pub fn apply(&mut self, spec: &FetchSpec, result: Result<ResultPage, String>) -> Applied {
    if spec.generation != self.generation {
      debug!(stale = spec.generation, current = self.generation, "discarding superseded fetch result");
      return Applied::Stale;
    }
    self.loading = false;

    let page = match result {
      Ok(page) => page,
      Err(message) => {
        self.items.clear();
        self.next_token = None;
        self.prev_token = None;
        self.error = Some(message);
        return Applied::Failed;
      }
    };

    self.error = None;
    self.next_token = page.next_page_token;
    self.prev_token = page.prev_page_token;
    self.total_results = page.total_results;
    let count = page.items.len();

    match spec.kind {
      FetchKind::Fresh => {
        self.items = page.items;
        if self.last_recorded.as_deref() != Some(spec.query.as_str()) {
          self.history.record(&spec.query);
          self.last_recorded = Some(spec.query.clone());
        }
        Applied::Replaced { count }
      }
      FetchKind::More => {
        self.items.extend(page.items);
        Applied::Appended { count }
      }
      FetchKind::Previous => {
        let mut items = page.items;
        items.append(&mut self.items);
        self.items = items;
        Applied::Prepended { count }
      }
    }
  }
}
