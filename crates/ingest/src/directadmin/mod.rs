//! DirectAdmin email log integration
//!
//! This module provides:
//! - The [`LogSource`] seam the sync driver fetches through
//! - A DirectAdmin API client for the `/api/email-logs` endpoint
//! - Normalization of log entries to domain records

mod client;
mod normalize;

pub use client::{DirectAdminClient, DirectAdminCredentials};
pub use normalize::{first_pending_time, is_pending, normalize_entry};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{DeliveryState, Direction};
use api::EmailLogResponse;

/// Parameters for one email log request
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
    /// Only entries involving this address
    pub address: Option<String>,
    /// Only entries involving this domain
    pub domain: Option<String>,
    pub state: Option<DeliveryState>,
    pub direction: Option<Direction>,
}

impl LogQuery {
    /// Query for every entry in `[from, to]`
    pub fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to: Some(to),
            address: None,
            domain: None,
            state: None,
            direction: None,
        }
    }
}

/// Source of email log entries
///
/// Implemented by [`DirectAdminClient`]; tests substitute canned responses.
pub trait LogSource: Send + Sync {
    /// Fetch log entries matching the query
    ///
    /// `more` on the response signals that the source truncated the result.
    fn fetch_logs(&self, query: &LogQuery) -> Result<EmailLogResponse>;
}

/// DirectAdmin API response types
pub mod api {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize};
    use serde_json::Value;

    use crate::models::DeliveryState;

    /// Response from the email logs endpoint
    ///
    /// Entries are kept exactly as received; each one is parsed on its own
    /// with [`EmailLogEntry::from_value`] so a malformed entry can't reject
    /// the rest of the response.
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct EmailLogResponse {
        /// More entries exist in the requested range than were returned
        #[serde(default, deserialize_with = "null_as_default")]
        pub more: bool,
        #[serde(default, deserialize_with = "null_as_default")]
        pub emails: Vec<Value>,
    }

    /// A recipient of a logged email with its own delivery state
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct EmailLogRecipient {
        #[serde(default, deserialize_with = "null_as_default")]
        pub address: String,
        #[serde(default, deserialize_with = "null_as_default")]
        pub state: DeliveryState,
        #[serde(default)]
        pub message: Option<String>,
        #[serde(default)]
        pub return_path: Option<String>,
    }

    /// A single email log entry
    ///
    /// Only `datetime` is required. Other fields may be missing or null.
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct EmailLogEntry {
        #[serde(default, deserialize_with = "string_or_number")]
        pub id: String,
        #[serde(deserialize_with = "deserialize_datetime")]
        pub datetime: DateTime<Utc>,
        #[serde(default, deserialize_with = "null_as_default")]
        pub state: DeliveryState,
        #[serde(default, deserialize_with = "null_as_default")]
        pub from: String,
        #[serde(default, deserialize_with = "null_as_default")]
        pub to: Vec<EmailLogRecipient>,
        #[serde(default)]
        pub direction: Option<String>,
        #[serde(default)]
        pub authenticator_client: Option<String>,
        #[serde(default)]
        pub dkim_verified: Option<String>,
        #[serde(default)]
        pub envelope_from: Option<String>,
        #[serde(default)]
        pub host: Option<String>,
        #[serde(default)]
        pub message_id: Option<String>,
        #[serde(default)]
        pub size: Option<i64>,
        #[serde(default)]
        pub subject: Option<String>,
        /// The entry as received
        #[serde(skip)]
        pub raw: Value,
    }

    impl EmailLogEntry {
        /// Parse an entry, keeping the original value alongside
        pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
            let mut entry = Self::deserialize(raw)?;
            entry.raw = raw.clone();
            Ok(entry)
        }
    }

    fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// IDs are strings, but numeric IDs are accepted and rendered as text
    fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Accept RFC 3339 as well as a bare `YYYY-MM-DD HH:MM:SS` (taken as UTC)
    fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| serde::de::Error::custom(format!("invalid datetime {raw:?}: {e}")))
    }

}
