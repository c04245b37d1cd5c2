//! DirectAdmin log entry normalization
//!
//! Converts log entries to inbound/outbound domain records and classifies
//! their delivery progress.

use chrono::{DateTime, Utc};

use super::api::EmailLogEntry;
use crate::models::{Direction, EmailRecord, InEmail, OutEmail};

/// Normalize a log entry to a record
///
/// Returns `None` when the entry's direction is neither "in" nor "out".
/// `now` becomes the record's update timestamp.
pub fn normalize_entry(entry: &EmailLogEntry, now: DateTime<Utc>) -> Option<EmailRecord> {
    let direction = Direction::parse(entry.direction.as_deref())?;

    let recipients: Vec<String> = entry.to.iter().map(|r| r.address.clone()).collect();
    let raw_data = entry.raw.clone();

    let record = match direction {
        Direction::In => EmailRecord::Incoming(InEmail {
            remote_id: entry.id.clone(),
            mail_from: entry.from.clone(),
            envelope_from: entry.envelope_from.clone(),
            timestamp: entry.datetime,
            update_timestamp: now,
            recipients,
            message_id: entry.message_id.clone(),
            subject: entry.subject.clone(),
            size: entry.size,
            raw_data,
            dkim_verified: entry.dkim_verified.clone(),
            smtp_host: entry.host.clone(),
        }),
        Direction::Out => EmailRecord::Outgoing(OutEmail {
            remote_id: entry.id.clone(),
            mail_from: entry.from.clone(),
            envelope_from: entry.envelope_from.clone(),
            timestamp: entry.datetime,
            update_timestamp: now,
            recipients,
            message_id: entry.message_id.clone(),
            subject: entry.subject.clone(),
            size: entry.size,
            raw_data,
            authenticator_client: entry.authenticator_client.clone(),
        }),
    };

    Some(record)
}

/// Whether the entry or any of its recipients may still change state
pub fn is_pending(entry: &EmailLogEntry) -> bool {
    !entry.state.is_finalized() || entry.to.iter().any(|r| !r.state.is_finalized())
}

/// Earliest datetime among pending entries, if any
pub fn first_pending_time<'a, I>(entries: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a EmailLogEntry>,
{
    entries
        .into_iter()
        .filter(|e| is_pending(e))
        .map(|e| e.datetime)
        .min()
}
