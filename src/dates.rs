//! Publish-date parsing and scrape/analysis date windows.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::ConfigError;

/// Offset-aware layouts seen in article metadata beyond RFC 3339/2822.
const AWARE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a publish date in any of the layouts news sites emit.
///
/// Offset-aware values are converted to UTC; naive values are taken as UTC
/// already. Returns `None` for empty input, sentinels and anything
/// unrecognized.
pub fn parse_publish_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() || crate::text::is_sentinel(s) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc).naive_utc());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    tracing::debug!(raw = %s, "Could not parse date with known formats");
    None
}

/// Parse a user-supplied calendar date (CLI or config).
pub fn parse_cli_date(raw: &str) -> Result<NaiveDate, ConfigError> {
    let s = raw.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ConfigError::InvalidDate(raw.to_string()))
}

/// The search engine's custom-range filter format, `MM/DD/YYYY`.
pub fn search_filter_format(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// An inclusive calendar-day window.
///
/// Constructed only through [`DateWindow::new`] or [`DateWindow::lookback`],
/// which clamp the end to today and reject inverted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Explicit range. `end` is clamped to `today`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvertedWindow`] when `start` falls after the clamped end.
    pub fn new(start: NaiveDate, requested_end: NaiveDate, today: NaiveDate) -> Result<Self, ConfigError> {
        let end = requested_end.min(today);
        if start > end {
            return Err(ConfigError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// `lookback_days` days ending at `min(requested_end, today)`, inclusive.
    pub fn lookback(requested_end: NaiveDate, lookback_days: u32, today: NaiveDate) -> Result<Self, ConfigError> {
        if lookback_days == 0 {
            return Err(ConfigError::ZeroLookback);
        }
        let end = requested_end.min(today);
        let start = end
            .checked_sub_days(Days::new(u64::from(lookback_days - 1)))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, end, today)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether a publish time falls on a day inside the window.
    pub fn contains(&self, when: NaiveDateTime) -> bool {
        let day = when.date();
        day >= self.start && day <= self.end
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// Last representable second of the end day.
    pub fn end_datetime(&self) -> NaiveDateTime {
        self.end
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.end.and_time(NaiveTime::MIN))
    }

    /// Start and end rendered for the search engine's date filter.
    pub fn search_filter(&self) -> (String, String) {
        (search_filter_format(self.start), search_filter_format(self.end))
    }

    /// Year used to suffix generated keywords.
    pub fn target_year(&self) -> i32 {
        self.start.year()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
