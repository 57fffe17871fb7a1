//! YouTube Data API v3 client: the two-stage search pipeline.
//!
//! Stage (a) is `search.list` — lightweight stubs plus opaque page tokens.
//! Stage (b) is `videos.list` keyed by the batch of ids from stage (a),
//! returning statistics and exact durations. Stage (b) results are joined
//! back onto the stubs by id; ids missing from the response keep zero-valued
//! defaults rather than dropping the item.
//!
//! Page tokens are provider-owned opaque strings and are round-tripped
//! verbatim, never parsed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::constants::constants;
use crate::format::{duration_seconds, format_count, format_duration, format_published};

// --- Filters ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  #[default]
  Relevance,
  Date,
  ViewCount,
  Rating,
  Title,
}

impl SortOrder {
  pub const ALL: [SortOrder; 5] =
    [SortOrder::Relevance, SortOrder::Date, SortOrder::ViewCount, SortOrder::Rating, SortOrder::Title];

  pub fn api_value(self) -> &'static str {
    match self {
      SortOrder::Relevance => "relevance",
      SortOrder::Date => "date",
      SortOrder::ViewCount => "viewCount",
      SortOrder::Rating => "rating",
      SortOrder::Title => "title",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      SortOrder::Relevance => "relevance",
      SortOrder::Date => "date",
      SortOrder::ViewCount => "views",
      SortOrder::Rating => "rating",
      SortOrder::Title => "title",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationBucket {
  #[default]
  Any,
  Short,
  Medium,
  Long,
}

impl DurationBucket {
  pub const ALL: [DurationBucket; 4] =
    [DurationBucket::Any, DurationBucket::Short, DurationBucket::Medium, DurationBucket::Long];

  pub fn api_value(self) -> &'static str {
    match self {
      DurationBucket::Any => "any",
      DurationBucket::Short => "short",
      DurationBucket::Medium => "medium",
      DurationBucket::Long => "long",
    }
  }
}

/// The user-adjustable subset of a search query. Replaced wholesale on any
/// filter-control interaction, never partially merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFilters {
  pub sort: SortOrder,
  pub duration: DurationBucket,
  pub hd: bool,
  pub captions: bool,
}

/// Query parameters a filter set contributes to a `search.list` call.
pub fn filter_params(filters: &SearchFilters) -> Vec<(&'static str, &'static str)> {
  let mut params = vec![("order", filters.sort.api_value())];
  if filters.duration != DurationBucket::Any {
    params.push(("videoDuration", filters.duration.api_value()));
  }
  if filters.hd {
    params.push(("videoDefinition", "high"));
  }
  if filters.captions {
    params.push(("videoCaption", "closedCaption"));
  }
  params
}

// --- Domain types ---

/// One media entry, fully joined and formatted for display.
#[derive(Debug, Clone)]
pub struct VideoItem {
  pub id: String,
  pub channel_id: String,
  pub channel_title: String,
  pub title: String,
  pub description: String,
  pub thumbnail: String,
  pub duration: String,
  pub duration_secs: u64,
  pub views: String,
  pub likes: String,
  pub comments: String,
  /// Raw publish timestamp, kept alongside the display string so re-sorting
  /// by date stays lossless.
  pub published_at: Option<DateTime<Utc>>,
  pub published: String,
}

/// One provider response page.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
  pub items: Vec<VideoItem>,
  pub next_page_token: Option<String>,
  pub prev_page_token: Option<String>,
  pub total_results: u64,
}

// --- Wire models (search.list) ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
  #[serde(rename = "nextPageToken")]
  next_page_token: Option<String>,
  #[serde(rename = "prevPageToken")]
  prev_page_token: Option<String>,
  #[serde(rename = "pageInfo", default)]
  page_info: Option<PageInfo>,
  #[serde(default)]
  items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
  #[serde(rename = "totalResults", default)]
  total_results: u64,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
  id: SearchItemId,
  snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
  #[serde(rename = "videoId")]
  video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
  #[serde(rename = "publishedAt")]
  published_at: String,
  #[serde(rename = "channelId")]
  channel_id: String,
  title: String,
  description: String,
  thumbnails: Thumbnails,
  #[serde(rename = "channelTitle")]
  channel_title: String,
}

#[derive(Debug, Deserialize, Default)]
struct Thumbnails {
  default: Option<ThumbnailData>,
  medium: Option<ThumbnailData>,
  high: Option<ThumbnailData>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailData {
  url: String,
}

impl Thumbnails {
  fn best(&self) -> String {
    self
      .high
      .as_ref()
      .or(self.medium.as_ref())
      .or(self.default.as_ref())
      .map(|t| t.url.clone())
      .unwrap_or_default()
  }
}

// --- Wire models (videos.list) ---

#[derive(Debug, Deserialize)]
struct DetailsResponse {
  #[serde(default)]
  items: Vec<DetailsItem>,
}

#[derive(Debug, Deserialize)]
struct DetailsItem {
  id: String,
  #[serde(default)]
  statistics: Option<Statistics>,
  #[serde(rename = "contentDetails", default)]
  content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize, Default)]
struct Statistics {
  #[serde(rename = "viewCount", default)]
  view_count: Option<String>,
  #[serde(rename = "likeCount", default)]
  like_count: Option<String>,
  #[serde(rename = "commentCount", default)]
  comment_count: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ContentDetails {
  #[serde(default)]
  duration: Option<String>,
}

// --- Client ---

#[derive(Clone)]
pub struct YouTubeApi {
  http: Client,
  api_key: String,
}

impl YouTubeApi {
  pub fn new(api_key: String) -> Self {
    Self { http: Client::new(), api_key }
  }

  /// Run both stages of a search and return a fully joined page.
  ///
  /// `page_token` is the opaque continuation token from a prior page, absent
  /// for a fresh search.
  pub async fn search_page(
    &self,
    query: &str,
    filters: &SearchFilters,
    page_token: Option<&str>,
  ) -> Result<ResultPage> {
    let c = constants();
    let page_size = c.page_size.to_string();
    let mut params: Vec<(&str, &str)> = vec![
      ("part", "snippet"),
      ("type", "video"),
      ("q", query),
      ("maxResults", &page_size),
      ("key", &self.api_key),
    ];
    params.extend(filter_params(filters));
    if let Some(token) = page_token {
      params.push(("pageToken", token));
    }

    debug!(query = %query, page_token = ?page_token, "search.list request");
    let response = self
      .http
      .get(&c.search_url)
      .query(&params)
      .send()
      .await
      .context("Failed to reach the search provider")?
      .error_for_status()
      .context("Search request was rejected")?;
    let search: SearchResponse = response.json().await.context("Failed to decode search response")?;

    let ids: Vec<String> = search.items.iter().filter_map(|i| i.id.video_id.clone()).collect();
    let details = if ids.is_empty() { DetailsResponse { items: Vec::new() } } else { self.video_details(&ids).await? };

    Ok(join_page(search, details))
  }

  /// Stage (b): batch statistics + contentDetails lookup by id.
  async fn video_details(&self, ids: &[String]) -> Result<DetailsResponse> {
    let c = constants();
    let joined = ids.join(",");
    let response = self
      .http
      .get(&c.videos_url)
      .query(&[("part", "statistics,contentDetails"), ("id", joined.as_str()), ("key", self.api_key.as_str())])
      .send()
      .await
      .context("Failed to reach the details provider")?
      .error_for_status()
      .context("Details request was rejected")?;
    response.json().await.context("Failed to decode details response")
  }
}

/// Join stage-(b) details onto stage-(a) stubs by id. Items whose id is
/// absent from the details response keep zero-valued formatted defaults.
fn join_page(search: SearchResponse, details: DetailsResponse) -> ResultPage {
  let by_id: HashMap<&str, &DetailsItem> = details.items.iter().map(|d| (d.id.as_str(), d)).collect();

  let items = search
    .items
    .into_iter()
    .filter_map(|item| {
      let id = item.id.video_id?;
      let detail = by_id.get(id.as_str());
      let stats = detail.and_then(|d| d.statistics.as_ref());
      let raw_duration = detail
        .and_then(|d| d.content_details.as_ref())
        .and_then(|cd| cd.duration.as_deref())
        .unwrap_or("PT0M0S");
      let published_at = DateTime::parse_from_rfc3339(&item.snippet.published_at).ok().map(|t| t.with_timezone(&Utc));

      Some(VideoItem {
        channel_id: item.snippet.channel_id,
        channel_title: item.snippet.channel_title,
        title: item.snippet.title,
        description: item.snippet.description,
        thumbnail: item.snippet.thumbnails.best(),
        duration: format_duration(raw_duration),
        duration_secs: duration_seconds(raw_duration),
        views: format_count(stats.and_then(|s| s.view_count.as_deref()).unwrap_or("0")),
        likes: format_count(stats.and_then(|s| s.like_count.as_deref()).unwrap_or("0")),
        comments: format_count(stats.and_then(|s| s.comment_count.as_deref()).unwrap_or("0")),
        published: published_at.as_ref().map(format_published).unwrap_or_default(),
        published_at,
        id,
      })
    })
    .collect();

  ResultPage {
    items,
    next_page_token: search.next_page_token,
    prev_page_token: search.prev_page_token,
    total_results: search.page_info.map(|p| p.total_results).unwrap_or(0),
  }
}
