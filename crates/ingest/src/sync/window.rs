//! Fetch window and watermark selection
//!
//! Pure functions so the incremental-fetch rules can be tested without I/O.

use chrono::{DateTime, TimeDelta, Utc};

/// The time range requested from the log source in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FetchWindow {
    /// Compute the next window to fetch
    ///
    /// Starts at the watermark, but never further back than `max_age` before
    /// `now`, and spans `fetch_window`. A negative span is treated as zero so
    /// `from <= to` always holds.
    pub fn compute(
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        max_age: TimeDelta,
        fetch_window: TimeDelta,
    ) -> Self {
        let min_time = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let from = match watermark {
            Some(w) if w > min_time => w,
            _ => min_time,
        };

        let to = from
            .checked_add_signed(fetch_window.max(TimeDelta::zero()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self { from, to }
    }
}

/// Where the next watermark came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkSource {
    /// Earliest entry that may still change state
    FirstPending,
    /// Last entry of a truncated response
    LastEntry,
    /// End of a fully consumed window
    WindowEnd,
    /// Truncated response without entries; the window start is kept
    Unchanged,
}

impl WatermarkSource {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::FirstPending => "first not fully delivered email",
            Self::LastEntry => "last email in list",
            Self::WindowEnd => "end of period",
            Self::Unchanged => "start of period (no emails returned)",
        }
    }
}

/// Decide where the next run starts
///
/// Pending entries win so they are fetched again; otherwise a truncated
/// response resumes at its last entry and a complete one at the window end.
pub fn next_watermark(
    first_pending: Option<DateTime<Utc>>,
    more: bool,
    last_entry: Option<DateTime<Utc>>,
    window: &FetchWindow,
) -> (DateTime<Utc>, WatermarkSource) {
    if let Some(pending) = first_pending {
        return (pending, WatermarkSource::FirstPending);
    }
    if more {
        return match last_entry {
            Some(last) => (last, WatermarkSource::LastEntry),
            None => (window.from, WatermarkSource::Unchanged),
        };
    }
    (window.to, WatermarkSource::WindowEnd)
}

/// Whether timestamps are non-decreasing
pub fn is_time_ordered<I>(times: I) -> bool
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut previous: Option<DateTime<Utc>> = None;
    for t in times {
        if previous.is_some_and(|p| t < p) {
            return false;
        }
        previous = Some(t);
    }
    true
}
