//! Pure display formatting for durations, engagement counts and publish dates.
//!
//! Duration input is the ISO-8601 subset YouTube's API emits (`PT1H2M3S`,
//! components optional). Counts arrive as decimal strings from the API's
//! statistics block and may be absent or malformed.

use chrono::{DateTime, Utc};

/// Render an ISO-8601 `PT#H#M#S` duration as `H:MM:SS`, or `M:SS` when no
/// hour component is present. Minutes are unpadded, seconds zero-padded;
/// absent minutes render as `0`.
pub fn format_duration(raw: &str) -> String {
  let (hours, minutes, seconds) = parse_iso8601_duration(raw);
  match hours {
    Some(h) => format!("{}:{:02}:{:02}", h, minutes.unwrap_or(0), seconds.unwrap_or(0)),
    None => format!("{}:{:02}", minutes.unwrap_or(0), seconds.unwrap_or(0)),
  }
}

/// Total seconds of an ISO-8601 duration token, 0 if unparseable.
pub fn duration_seconds(raw: &str) -> u64 {
  let (h, m, s) = parse_iso8601_duration(raw);
  h.unwrap_or(0) * 3600 + m.unwrap_or(0) * 60 + s.unwrap_or(0)
}

/// Parse the optional hour/minute/second components of `PT#H#M#S`.
/// Unknown or missing components are `None`; anything before the `T` (the
/// date part of full ISO-8601 durations) is ignored.
fn parse_iso8601_duration(raw: &str) -> (Option<u64>, Option<u64>, Option<u64>) {
  let Some(t) = raw.find('T') else { return (None, None, None) };
  let mut hours = None;
  let mut minutes = None;
  let mut seconds = None;
  let mut num = String::new();
  for c in raw[t + 1..].chars() {
    if c.is_ascii_digit() {
      num.push(c);
      continue;
    }
    let value = num.parse::<u64>().ok();
    num.clear();
    match c {
      'H' => hours = value,
      'M' => minutes = value,
      'S' => seconds = value,
      _ => return (None, None, None),
    }
  }
  (hours, minutes, seconds)
}

/// Render a raw decimal count: `>= 1_000_000` as `{n}.{d}M`, `>= 1_000` as
/// `{n}.{d}K` (one decimal each), smaller values as the bare integer.
/// Non-numeric input renders as `"0"`.
pub fn format_count(raw: &str) -> String {
  let Ok(n) = raw.trim().parse::<u64>() else { return "0".to_string() };
  if n >= 1_000_000 {
    format!("{:.1}M", n as f64 / 1_000_000.0)
  } else if n >= 1_000 {
    format!("{:.1}K", n as f64 / 1_000.0)
  } else {
    n.to_string()
  }
}

/// Display form of a publish timestamp (`YYYY-MM-DD`). The raw timestamp is
/// kept on the item so re-sorting by date stays possible after formatting.
pub fn format_published(ts: &DateTime<Utc>) -> String {
  ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  // --- format_duration ---

  #[test]
  fn duration_minutes_seconds() {
    assert_eq!(format_duration("PT4M13S"), "4:13");
    assert_eq!(format_duration("PT12M5S"), "12:05");
  }

  #[test]
  fn duration_with_hours_pads_minutes_and_seconds() {
    assert_eq!(format_duration("PT1H2M3S"), "1:02:03");
    assert_eq!(format_duration("PT2H0M0S"), "2:00:00");
    assert_eq!(format_duration("PT10H59M59S"), "10:59:59");
  }

  #[test]
  fn duration_missing_components() {
    // Absent minutes render as 0; absent seconds as 00
    assert_eq!(format_duration("PT45S"), "0:45");
    assert_eq!(format_duration("PT3M"), "3:00");
    assert_eq!(format_duration("PT1H"), "1:00:00");
    assert_eq!(format_duration("PT1H30S"), "1:00:30");
  }

  #[test]
  fn duration_zero_and_garbage() {
    assert_eq!(format_duration("PT0M0S"), "0:00");
    assert_eq!(format_duration(""), "0:00");
    assert_eq!(format_duration("garbage"), "0:00");
  }

  #[test]
  fn duration_total_seconds() {
    assert_eq!(duration_seconds("PT1H2M3S"), 3723);
    assert_eq!(duration_seconds("PT45S"), 45);
    assert_eq!(duration_seconds("nope"), 0);
  }

  // --- format_count ---

  #[test]
  fn count_millions_one_decimal() {
    assert_eq!(format_count("1200000"), "1.2M");
    assert_eq!(format_count("1000000"), "1.0M");
    assert_eq!(format_count("15500000"), "15.5M");
  }

  #[test]
  fn count_thousands_one_decimal() {
    assert_eq!(format_count("1000"), "1.0K");
    assert_eq!(format_count("999999"), "1000.0K");
    assert_eq!(format_count("3400"), "3.4K");
  }

  #[test]
  fn count_small_values_bare() {
    assert_eq!(format_count("0"), "0");
    assert_eq!(format_count("999"), "999");
    assert_eq!(format_count("42"), "42");
  }

  #[test]
  fn count_non_numeric_is_zero() {
    assert_eq!(format_count(""), "0");
    assert_eq!(format_count("abc"), "0");
    assert_eq!(format_count("-5"), "0");
  }

  // --- format_published ---

  #[test]
  fn published_date_display() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
    assert_eq!(format_published(&ts), "2024-03-09");
  }
}
