//! Utility functions for text cleanup, date handling and file system setup.
//!
//! This module provides helper functions used throughout the application:
//! - Digit extraction for free-text view counts
//! - `YYYYMMDD` date formatting and the "days back" target date
//! - String truncation for logging
//! - Directory preparation for file-backed SQLite databases

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Keep only the digit runs of a free-text counter.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(digits_only("조회수 1,234"), "1234");
/// assert_eq!(digits_only("no digits"), "");
/// ```
pub fn digits_only(text: &str) -> String {
    DIGITS.find_iter(text).map(|m| m.as_str()).collect()
}

/// Format a date the way the ranking page expects it (`YYYYMMDD`).
pub fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a `YYYYMMDD` date string.
pub fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

/// The date `offset` days before `today`.
pub fn days_back(today: NaiveDate, offset: i64) -> NaiveDate {
    today - Duration::days(offset)
}

/// Today's calendar date in the given time zone.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or below `max` bytes and
/// get `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Create the parent directory of a file-backed SQLite URL.
///
/// In-memory URLs and URLs without a directory component are left alone.
#[instrument(level = "info", skip_all, fields(database_url = %database_url))]
pub async fn ensure_sqlite_dir(database_url: &str) -> Result<(), Box<dyn Error>> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
            info!(dir = %parent.display(), "Database directory ready");
        }
    }
    Ok(())
}
