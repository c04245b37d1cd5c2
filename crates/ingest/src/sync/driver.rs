//! Scheduled sync run
//!
//! One run fetches a bounded window of email logs, stores every entry with a
//! known direction in a single batch, then advances the watermark. A run that
//! fails anywhere leaves the watermark untouched so the next tick requests
//! the same window again.

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use super::window::{FetchWindow, WatermarkSource, is_time_ordered, next_watermark};
use crate::directadmin::api::EmailLogEntry;
use crate::directadmin::{LogQuery, LogSource, first_pending_time, is_pending, normalize_entry};
use crate::models::{Direction, Watermark, format_timestamp};
use crate::notify::Alerter;
use crate::storage::{RecordStore, StateStore};

/// Fatal sync failures
///
/// Each variant aborts the run before the watermark is written.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to fetch email logs: {0:#}")]
    SourceFetch(anyhow::Error),
    #[error("Failed to insert emails into database: {0:#}")]
    Persistence(anyhow::Error),
    #[error("Failed to access watermark state: {0:#}")]
    State(anyhow::Error),
}

/// Window sizing for sync runs
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// How far back a run may ever look
    pub max_age: TimeDelta,
    /// Maximum span requested in one run
    pub fetch_window: TimeDelta,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::hours(24),
            fetch_window: TimeDelta::hours(6),
        }
    }
}

/// Statistics from a sync run
#[derive(Debug, Clone)]
pub struct SyncStats {
    /// Window that was requested
    pub window: FetchWindow,
    /// Number of log entries returned by the source
    pub entries_fetched: usize,
    /// Whether the source reported more entries than it returned
    pub more: bool,
    pub incoming_stored: usize,
    pub outgoing_stored: usize,
    /// Entries skipped because of an unrecognized direction
    pub skipped: usize,
    /// Entries skipped because they couldn't be parsed
    pub malformed: usize,
    /// Stored entries that may still change delivery state
    pub pending: usize,
    /// Where the next run will start
    pub next_watermark: DateTime<Utc>,
    pub watermark_source: WatermarkSource,
    /// Duration of the sync run
    pub duration_ms: u64,
}

/// Drives incremental ingestion of email logs
pub struct Ingester {
    source: Arc<dyn LogSource>,
    records: Arc<dyn RecordStore>,
    state: Arc<dyn StateStore>,
    alerter: Alerter,
    options: SyncOptions,
}

impl Ingester {
    pub fn new(
        source: Arc<dyn LogSource>,
        records: Arc<dyn RecordStore>,
        state: Arc<dyn StateStore>,
        alerter: Alerter,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            records,
            state,
            alerter,
            options,
        }
    }

    pub fn alerter(&self) -> &Alerter {
        &self.alerter
    }

    /// Run one sync as of `now`
    ///
    /// Blocking: performs HTTP and database I/O on the calling thread.
    pub fn run(&self, now: DateTime<Utc>) -> Result<SyncStats, SyncError> {
        let start = Instant::now();
        info!("Fetching emails - triggered at {}", format_timestamp(now));

        let previous = self
            .state
            .load_watermark()
            .map_err(|e| self.abort(SyncError::State(e)))?;
        info!(
            "Last fetched email time: {}, last run time: {}",
            display_time(previous.last_fetched_email_time),
            display_time(previous.last_run_time)
        );

        let window = FetchWindow::compute(
            previous.last_fetched_email_time,
            now,
            self.options.max_age,
            self.options.fetch_window,
        );
        info!(
            "Fetching emails from {} to {}",
            format_timestamp(window.from),
            format_timestamp(window.to)
        );

        let logs = self
            .source
            .fetch_logs(&LogQuery::window(window.from, window.to))
            .map_err(|e| self.abort(SyncError::SourceFetch(e)))?;

        info!(
            "Received {} email logs, incomplete: {}",
            logs.emails.len(),
            logs.more
        );
        if logs.more {
            self.alerter.alert(format!(
                "Received incomplete email response. got {} messages",
                logs.emails.len()
            ));
        }

        // A malformed entry is reported and dropped; the rest of the batch still counts
        let mut entries = Vec::with_capacity(logs.emails.len());
        let mut malformed = 0;
        for raw in &logs.emails {
            match EmailLogEntry::from_value(raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    malformed += 1;
                    self.alerter.alert(format!(
                        "Malformed email log entry: {}\n```json\n{}\n```",
                        e,
                        pretty_json(raw)
                    ));
                }
            }
        }

        if !is_time_ordered(entries.iter().map(|e| e.datetime)) {
            warn!("Email logs are not in chronological order; the last entry may not be the latest");
        }

        // Classify and normalize
        let mut records = Vec::with_capacity(entries.len());
        let mut stored_entries: Vec<&EmailLogEntry> = Vec::with_capacity(entries.len());
        let mut skipped = 0;

        for entry in &entries {
            let Some(record) = normalize_entry(entry, now) else {
                skipped += 1;
                self.alerter.alert(format!(
                    "Unknown email direction: {}\n```json\n{}\n```",
                    entry.direction.as_deref().unwrap_or("<missing>"),
                    pretty_json(&entry.raw)
                ));
                continue;
            };

            if is_pending(entry) {
                self.alerter.alert(format!(
                    "Found email that is not fully delivered\n```json\n{}\n```",
                    pretty_json(&entry.raw)
                ));
            }

            records.push(record);
            stored_entries.push(entry);
        }

        let incoming_stored = records
            .iter()
            .filter(|r| r.direction() == Direction::In)
            .count();
        let outgoing_stored = records.len() - incoming_stored;
        let pending = stored_entries.iter().filter(|e| is_pending(e)).count();
        let first_pending = first_pending_time(stored_entries.iter().copied());

        info!(
            "Processed {} incoming emails and {} outgoing emails. writing to DB",
            incoming_stored, outgoing_stored
        );

        let written = self
            .records
            .insert_batch(&records)
            .map_err(|e| self.abort(SyncError::Persistence(e)))?;
        info!("Inserted {} emails into database", written);

        let (next, watermark_source) = next_watermark(
            first_pending,
            logs.more,
            entries.last().map(|e| e.datetime),
            &window,
        );
        info!(
            "Using time from {}: {}",
            watermark_source.describe(),
            format_timestamp(next)
        );
        if next <= window.from && !entries.is_empty() {
            warn!(
                "Watermark did not advance past {}; the same window will be fetched again",
                format_timestamp(window.from)
            );
        }

        let elapsed = start.elapsed();
        let finished = now + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero());
        self.state
            .save_watermark(&Watermark::new(next, finished))
            .map_err(|e| self.abort(SyncError::State(e)))?;

        let duration_ms = elapsed.as_millis() as u64;
        info!("Done: next fetch from {}", format_timestamp(next));
        info!("Ran in {}ms", duration_ms);

        Ok(SyncStats {
            window,
            entries_fetched: logs.emails.len(),
            more: logs.more,
            incoming_stored,
            outgoing_stored,
            skipped,
            malformed,
            pending,
            next_watermark: next,
            watermark_source,
            duration_ms,
        })
    }

    /// Alert about a fatal error and hand it back for propagation
    fn abort(&self, error: SyncError) -> SyncError {
        self.alerter.alert(error.to_string());
        error
    }
}

fn display_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_timestamp)
        .unwrap_or_else(|| "never".to_string())
}

fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        debug!("Failed to render log entry: {}", e);
        value.to_string()
    })
}
