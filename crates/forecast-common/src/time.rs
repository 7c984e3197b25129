//! Time handling utilities for forecast data.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Naive layouts accepted in requests and provider payloads, all read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 timestamp.
///
/// Accepts RFC 3339 with offset, naive date-times (`T` or space separated,
/// with or without seconds) and bare dates, which mean midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Floor a timestamp to a multiple of `minutes` counted from the Unix epoch.
pub fn floor_to_interval(dt: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let step = i64::from(minutes.max(1)) * 60;
    let rem = dt.timestamp().rem_euclid(step);
    dt - Duration::seconds(rem) - Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()))
}

/// Whether a timestamp sits exactly on a `minutes` boundary.
pub fn is_aligned(dt: DateTime<Utc>, minutes: u32) -> bool {
    floor_to_interval(dt, minutes) == dt
}

/// Label used for raster band names and file names.
pub fn band_label(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// One day starting at `start`, used when a request gives no end.
    pub fn one_day_from(start: DateTime<Utc>) -> Self {
        Self::new(start, start + Duration::days(1))
    }

    /// Inclusive on both ends.
    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Restrict the window to `[lower, upper]`, or `None` when they don't overlap.
    pub fn clip(&self, lower: DateTime<Utc>, upper: DateTime<Utc>) -> Option<TimeWindow> {
        let start = self.start.max(lower);
        let end = self.end.min(upper);
        if start > end {
            return None;
        }
        Some(TimeWindow::new(start, end))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
