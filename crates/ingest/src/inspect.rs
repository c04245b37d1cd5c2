//! Read-only status report for the inspection endpoint

use anyhow::Result;

use crate::models::Watermark;
use crate::storage::{RecordStore, StateStore};

/// Snapshot of ingestion progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub incoming: u64,
    pub outgoing: u64,
    /// Raw stored value, shown even when it doesn't parse
    pub last_fetched_email_time: Option<String>,
    pub last_run_time: Option<String>,
}

impl StatusReport {
    pub fn collect(records: &dyn RecordStore, state: &dyn StateStore) -> Result<Self> {
        let counts = records.count_records()?;
        Ok(Self {
            incoming: counts.incoming,
            outgoing: counts.outgoing,
            last_fetched_email_time: state.get_state(Watermark::LAST_FETCHED_EMAIL_TIME)?,
            last_run_time: state.get_state(Watermark::LAST_RUN_TIME)?,
        })
    }

    /// Plain-text body, absent slots rendered as `null`
    pub fn render(&self) -> String {
        format!(
            "Incoming: {}\nOutgoing: {}\nLast fetched email time: {}\nLast run time: {}",
            self.incoming,
            self.outgoing,
            self.last_fetched_email_time.as_deref().unwrap_or("null"),
            self.last_run_time.as_deref().unwrap_or("null"),
        )
    }
}

/// What an inspection request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    NotFound,
}

/// Match a request path against the configured secret path
///
/// `magic_path` is stored without surrounding slashes. The query string and
/// HTTP method are ignored.
pub fn route(path: &str, magic_path: &str) -> Route {
    let path = path.split('?').next().unwrap_or_default();
    match path.strip_prefix('/') {
        Some(rest) if !magic_path.is_empty() && rest == magic_path => Route::Status,
        _ => Route::NotFound,
    }
}
