//! SQLite-based storage for email records and watermark state

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{RecordCounts, RecordStore, StateStore};
use crate::models::{EmailRecord, InEmail, OutEmail, format_timestamp};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Emails received by the server
            CREATE TABLE incoming_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id TEXT NOT NULL,
                mail_from TEXT NOT NULL,
                envelope_from TEXT,
                timestamp TEXT NOT NULL,
                update_timestamp TEXT NOT NULL,
                recipients TEXT NOT NULL,
                message_id TEXT,
                subject TEXT,
                size INTEGER,
                raw_data TEXT NOT NULL,
                dkim_verified TEXT,
                smtp_host TEXT
            );

            CREATE INDEX idx_incoming_remote_id ON incoming_emails(remote_id);
            CREATE INDEX idx_incoming_timestamp ON incoming_emails(timestamp);

            -- Emails sent through the server
            CREATE TABLE outgoing_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id TEXT NOT NULL,
                mail_from TEXT NOT NULL,
                envelope_from TEXT,
                timestamp TEXT NOT NULL,
                update_timestamp TEXT NOT NULL,
                recipients TEXT NOT NULL,
                message_id TEXT,
                subject TEXT,
                size INTEGER,
                raw_data TEXT NOT NULL,
                authenticator_client TEXT
            );

            CREATE INDEX idx_outgoing_remote_id ON outgoing_emails(remote_id);
            CREATE INDEX idx_outgoing_timestamp ON outgoing_emails(timestamp);

            -- Watermark slots
            CREATE TABLE state_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-based storage
///
/// Holds both the email record tables and the watermark key/value table.
/// Record batches and watermark updates are separate transactions.
///
/// Writes and reads use separate connections. In WAL mode the reader sees
/// the last committed state while a batch is being written, so status
/// queries never wait for a sync run. The path must be a file, not `:memory:`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        let reader = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open read connection at {:?}", db_path.as_ref()))?;
        reader.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;
            PRAGMA query_only = ON;
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            reader: Mutex::new(reader),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    fn read(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| anyhow!("SQLite read connection lock poisoned"))
    }

    fn insert_incoming(tx: &Transaction<'_>, email: &InEmail, recipients: &str, raw: &str) -> Result<()> {
        tx.execute(
            "INSERT INTO incoming_emails
             (remote_id, mail_from, envelope_from, timestamp, update_timestamp,
              recipients, message_id, subject, size, raw_data, dkim_verified, smtp_host)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                email.remote_id,
                email.mail_from,
                email.envelope_from,
                format_timestamp(email.timestamp),
                format_timestamp(email.update_timestamp),
                recipients,
                email.message_id,
                email.subject,
                email.size,
                raw,
                email.dkim_verified,
                email.smtp_host,
            ],
        )?;
        Ok(())
    }

    fn insert_outgoing(tx: &Transaction<'_>, email: &OutEmail, recipients: &str, raw: &str) -> Result<()> {
        tx.execute(
            "INSERT INTO outgoing_emails
             (remote_id, mail_from, envelope_from, timestamp, update_timestamp,
              recipients, message_id, subject, size, raw_data, authenticator_client)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                email.remote_id,
                email.mail_from,
                email.envelope_from,
                format_timestamp(email.timestamp),
                format_timestamp(email.update_timestamp),
                recipients,
                email.message_id,
                email.subject,
                email.size,
                raw,
                email.authenticator_client,
            ],
        )?;
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn insert_batch(&self, records: &[EmailRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for record in records {
            let recipients = record.recipients_text();
            let raw = record.raw_json();
            let inserted = match record {
                EmailRecord::Incoming(email) => {
                    Self::insert_incoming(&tx, email, &recipients, &raw)
                }
                EmailRecord::Outgoing(email) => {
                    Self::insert_outgoing(&tx, email, &recipients, &raw)
                }
            };
            inserted.with_context(|| format!("Failed to insert email {}", record.remote_id()))?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().context("Failed to commit email batch")?;
        Ok(records.len())
    }

    fn count_records(&self) -> Result<RecordCounts> {
        let conn = self.read()?;
        let incoming: i64 =
            conn.query_row("SELECT COUNT(*) FROM incoming_emails", [], |row| row.get(0))?;
        let outgoing: i64 =
            conn.query_row("SELECT COUNT(*) FROM outgoing_emails", [], |row| row.get(0))?;
        Ok(RecordCounts {
            incoming: incoming as u64,
            outgoing: outgoing as u64,
        })
    }
}

impl StateStore for SqliteStore {
    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.read()?;
        let value = conn
            .query_row("SELECT value FROM state_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO state_kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .with_context(|| format!("Failed to write state {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Watermark;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("ingest.test.sqlite");
        let store = SqliteStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_in(id: &str) -> EmailRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        EmailRecord::Incoming(InEmail {
            remote_id: id.to_string(),
            mail_from: "a@remote.com".to_string(),
            envelope_from: Some("bounce@remote.com".to_string()),
            timestamp: ts,
            update_timestamp: ts,
            recipients: vec!["me@example.com".to_string(), "you@example.com".to_string()],
            message_id: Some("<x@remote.com>".to_string()),
            subject: Some("Hello".to_string()),
            size: Some(512),
            raw_data: json!({"id": id, "direction": "in"}),
            dkim_verified: Some("pass".to_string()),
            smtp_host: Some("mx.remote.com".to_string()),
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
            raw_data: json!({"id": id, "direction": "out"}),
            authenticator_client: Some("roundcube".to_string()),
        })
    }

    #[test]
    fn test_insert_batch_and_count() {
        let (store, _dir) = create_test_store();

        let written = store
            .insert_batch(&[make_in("1"), make_out("2"), make_out("3")])
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            store.count_records().unwrap(),
            RecordCounts {
                incoming: 1,
                outgoing: 2
            }
        );
    }

    #[test]
    fn test_row_contents() {
        let (store, _dir) = create_test_store();
        store.insert_batch(&[make_in("42")]).unwrap();

        let conn = store.lock().unwrap();
        let (recipients, timestamp, raw): (String, String, String) = conn
            .query_row(
                "SELECT recipients, timestamp, raw_data FROM incoming_emails WHERE remote_id = '42'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(recipients, "me@example.com\nyou@example.com");
        assert_eq!(timestamp, "2024-01-01T00:00:00.000Z");
        let raw: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(raw["direction"], "in");
    }

    #[test]
    fn test_duplicate_remote_ids_are_appended() {
        let (store, _dir) = create_test_store();
        store.insert_batch(&[make_out("dup")]).unwrap();
        store.insert_batch(&[make_out("dup")]).unwrap();
        assert_eq!(store.count_records().unwrap().outgoing, 2);
    }

    #[test]
    fn test_empty_batch() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.insert_batch(&[]).unwrap(), 0);
        assert_eq!(store.count_records().unwrap(), RecordCounts::default());
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let (store, _dir) = create_test_store();
        {
            let conn = store.lock().unwrap();
            // Reject the second outgoing row to force a mid-batch failure
            conn.execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON outgoing_emails
                 WHEN NEW.remote_id = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let result = store.insert_batch(&[make_in("1"), make_out("ok"), make_out("bad")]);
        assert!(result.is_err());
        assert_eq!(store.count_records().unwrap(), RecordCounts::default());
    }

    #[test]
    fn test_state_kv() {
        let (store, _dir) = create_test_store();
        assert!(store.get_state("missing").unwrap().is_none());

        store.put_state("k", "v1").unwrap();
        store.put_state("k", "v2").unwrap();
        assert_eq!(store.get_state("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_watermark_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ingest.test.sqlite");
        let fetched = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let ran = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        {
            let store = SqliteStore::new(&db_path).unwrap();
            store.save_watermark(&Watermark::new(fetched, ran)).unwrap();
        }

        let reopened = SqliteStore::new(&db_path).unwrap();
        assert_eq!(reopened.load_watermark().unwrap(), Watermark::new(fetched, ran));
    }

    #[test]
    fn test_reads_do_not_wait_for_open_batch() {
        let (store, _dir) = create_test_store();
        store.insert_batch(&[make_in("committed")]).unwrap();
        store.put_state(Watermark::LAST_RUN_TIME, "2024-01-01T00:00:00.000Z").unwrap();

        // Hold the writer with an uncommitted batch
        let mut writer = store.lock().unwrap();
        let tx = writer.transaction().unwrap();
        tx.execute(
            "INSERT INTO outgoing_emails
             (remote_id, mail_from, timestamp, update_timestamp, recipients, raw_data)
             VALUES ('pending', 'me@example.com', 't', 't', '', '{}')",
            [],
        )
        .unwrap();

        let counts = store.count_records().unwrap();
        assert_eq!(counts.incoming, 1);
        assert_eq!(counts.outgoing, 0);
        assert_eq!(
            store.get_state(Watermark::LAST_RUN_TIME).unwrap().as_deref(),
            Some("2024-01-01T00:00:00.000Z")
        );

        tx.commit().unwrap();
        drop(writer);
        assert_eq!(store.count_records().unwrap().outgoing, 1);
    }
}
