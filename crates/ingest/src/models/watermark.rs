//! Watermark tracking for incremental log fetching

use chrono::{DateTime, SecondsFormat, Utc};

/// Progress of incremental fetching
///
/// Persisted in the state store as two independent string slots.
/// Only advanced by a run that completed the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermark {
    /// Where the next fetch window starts
    pub last_fetched_email_time: Option<DateTime<Utc>>,
    /// When the last successful run finished (diagnostic only)
    pub last_run_time: Option<DateTime<Utc>>,
}

impl Watermark {
    /// State store key for the fetch cursor
    pub const LAST_FETCHED_EMAIL_TIME: &'static str = "last_fetched_email_time";
    /// State store key for the last run completion time
    pub const LAST_RUN_TIME: &'static str = "last_run_time";

    pub fn new(last_fetched_email_time: DateTime<Utc>, last_run_time: DateTime<Utc>) -> Self {
        Self {
            last_fetched_email_time: Some(last_fetched_email_time),
            last_run_time: Some(last_run_time),
        }
    }
}

/// Format a timestamp the way it is stored and sent to the API
///
/// RFC 3339 in UTC with millisecond precision, e.g. `2024-01-01T06:00:00.000Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp, accepting any RFC 3339 offset
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
