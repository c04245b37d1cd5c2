//! In-memory storage implementation
//!
//! Used by tests and for dry runs where nothing should touch disk.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{RecordCounts, RecordStore, StateStore};
use crate::models::{Direction, EmailRecord};

/// In-memory implementation of [`RecordStore`] and [`StateStore`]
///
/// Uses collections protected by RwLocks for thread-safe access.
pub struct InMemoryStore {
    records: RwLock<Vec<EmailRecord>>,
    state: RwLock<HashMap<String, String>>,
    /// When set, batch inserts fail without storing anything
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            state: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent batch inserts fail (simulates a database outage)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every stored record, in insertion order
    pub fn records(&self) -> Vec<EmailRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryStore {
    fn insert_batch(&self, records: &[EmailRecord]) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("record lock poisoned"))?;
        stored.extend_from_slice(records);
        Ok(records.len())
    }

    fn count_records(&self) -> Result<RecordCounts> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("record lock poisoned"))?;
        let incoming = stored
            .iter()
            .filter(|r| r.direction() == Direction::In)
            .count() as u64;
        Ok(RecordCounts {
            incoming,
            outgoing: stored.len() as u64 - incoming,
        })
    }
}

impl StateStore for InMemoryStore {
    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let state = self
            .state
            .read()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))?;
        Ok(state.get(key).cloned())
    }

    fn put_state(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))?;
        state.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InEmail, OutEmail, Watermark};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn make_in(id: &str) -> EmailRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        EmailRecord::Incoming(InEmail {
            remote_id: id.to_string(),
            mail_from: "a@remote.com".to_string(),
            envelope_from: None,
            timestamp: ts,
            update_timestamp: ts,
            recipients: vec!["me@example.com".to_string()],
            message_id: None,
            subject: None,
            size: None,
            raw_data: json!({"id": id}),
            dkim_verified: None,
            smtp_host: None,
        })
    }

    fn make_out(id: &str) -> EmailRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        EmailRecord::Outgoing(OutEmail {
            remote_id: id.to_string(),
            mail_from: "me@example.com".to_string(),
            envelope_from: None,
            timestamp: ts,
            update_timestamp: ts,
            recipients: vec!["a@remote.com".to_string()],
            message_id: None,
            subject: None,
            size: None,
            raw_data: json!({"id": id}),
            authenticator_client: None,
        })
    }

    #[test]
    fn test_insert_and_count() {
        let store = InMemoryStore::new();
        let written = store
            .insert_batch(&[make_in("1"), make_out("2"), make_in("3")])
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            store.count_records().unwrap(),
            RecordCounts {
                incoming: 2,
                outgoing: 1
            }
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let store = InMemoryStore::new();
        store.insert_batch(&[make_in("1")]).unwrap();
        store.insert_batch(&[make_in("1")]).unwrap();
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn test_failed_write_stores_nothing() {
        let store = InMemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.insert_batch(&[make_in("1"), make_out("2")]).is_err());
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_watermark_round_trip() {
        let store = InMemoryStore::new();
        assert_eq!(store.load_watermark().unwrap(), Watermark::default());

        let fetched = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let ran = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap();
        store.save_watermark(&Watermark::new(fetched, ran)).unwrap();

        assert_eq!(
            store.get_state(Watermark::LAST_FETCHED_EMAIL_TIME).unwrap().as_deref(),
            Some("2024-01-01T06:00:00.000Z")
        );
        assert_eq!(store.load_watermark().unwrap(), Watermark::new(fetched, ran));
    }

    #[test]
    fn test_corrupt_watermark_is_treated_as_absent() {
        let store = InMemoryStore::new();
        store
            .put_state(Watermark::LAST_FETCHED_EMAIL_TIME, "not a time")
            .unwrap();
        assert!(store.load_watermark().unwrap().last_fetched_email_time.is_none());
    }
}
