//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;

use crate::models::{EmailRecord, Watermark, format_timestamp, parse_timestamp};

/// Number of persisted records per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub incoming: u64,
    pub outgoing: u64,
}

/// Trait for email record persistence
///
/// Records are append-only: there is no upsert and the same remote ID may
/// be stored more than once.
pub trait RecordStore: Send + Sync {
    /// Insert all records atomically
    ///
    /// Either every record is stored or none is. Returns the number of rows written.
    fn insert_batch(&self, records: &[EmailRecord]) -> Result<usize>;

    /// Count stored records per direction
    fn count_records(&self) -> Result<RecordCounts>;
}

/// Trait for the string key/value slots holding watermark state
pub trait StateStore: Send + Sync {
    /// Read a value
    fn get_state(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn put_state(&self, key: &str, value: &str) -> Result<()>;

    /// Load both watermark slots
    ///
    /// A stored value that doesn't parse as a timestamp is logged and treated
    /// as absent, so a corrupt slot falls back to the maximum look-back.
    fn load_watermark(&self) -> Result<Watermark> {
        Ok(Watermark {
            last_fetched_email_time: get_timestamp(self, Watermark::LAST_FETCHED_EMAIL_TIME)?,
            last_run_time: get_timestamp(self, Watermark::LAST_RUN_TIME)?,
        })
    }

    /// Save both watermark slots; absent slots are left untouched
    fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        if let Some(ts) = watermark.last_run_time {
            self.put_state(Watermark::LAST_RUN_TIME, &format_timestamp(ts))?;
        }
        if let Some(ts) = watermark.last_fetched_email_time {
            self.put_state(Watermark::LAST_FETCHED_EMAIL_TIME, &format_timestamp(ts))?;
        }
        Ok(())
    }
}

fn get_timestamp<S: StateStore + ?Sized>(store: &S, key: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = store.get_state(key)? else {
        return Ok(None);
    };
    let parsed = parse_timestamp(&raw);
    if parsed.is_none() {
        warn!("[STATE] Ignoring unparsable {} value {:?}", key, raw);
    }
    Ok(parsed)
}
