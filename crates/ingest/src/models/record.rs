//! Normalized email records persisted by the ingester

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

/// Separator used when flattening the recipient list into a single column
const RECIPIENT_SEPARATOR: &str = "\n";

/// An email received by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InEmail {
    /// DirectAdmin log entry ID
    pub remote_id: String,
    pub mail_from: String,
    pub envelope_from: Option<String>,
    /// When the server logged the email
    pub timestamp: DateTime<Utc>,
    /// When this record was produced from the log entry
    pub update_timestamp: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub size: Option<i64>,
    /// The complete log entry as received
    pub raw_data: serde_json::Value,
    pub dkim_verified: Option<String>,
    /// Remote host the email was received from
    pub smtp_host: Option<String>,
}

/// An email sent through the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutEmail {
    /// DirectAdmin log entry ID
    pub remote_id: String,
    pub mail_from: String,
    pub envelope_from: Option<String>,
    /// When the server logged the email
    pub timestamp: DateTime<Utc>,
    /// When this record was produced from the log entry
    pub update_timestamp: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub size: Option<i64>,
    /// The complete log entry as received
    pub raw_data: serde_json::Value,
    /// Client that authenticated to send the email
    pub authenticator_client: Option<String>,
}

/// A normalized record of either direction
#[derive(Debug, Clone, PartialEq)]
pub enum EmailRecord {
    Incoming(InEmail),
    Outgoing(OutEmail),
}

impl EmailRecord {
    pub fn direction(&self) -> Direction {
        match self {
            Self::Incoming(_) => Direction::In,
            Self::Outgoing(_) => Direction::Out,
        }
    }

    pub fn remote_id(&self) -> &str {
        match self {
            Self::Incoming(email) => &email.remote_id,
            Self::Outgoing(email) => &email.remote_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Incoming(email) => email.timestamp,
            Self::Outgoing(email) => email.timestamp,
        }
    }

    /// Recipients flattened into the persisted column format
    pub fn recipients_text(&self) -> String {
        let recipients = match self {
            Self::Incoming(email) => &email.recipients,
            Self::Outgoing(email) => &email.recipients,
        };
        recipients.join(RECIPIENT_SEPARATOR)
    }

    /// Raw log entry serialized for the audit column
    pub fn raw_json(&self) -> String {
        let raw = match self {
            Self::Incoming(email) => &email.raw_data,
            Self::Outgoing(email) => &email.raw_data,
        };
        raw.to_string()
    }
}

impl From<InEmail> for EmailRecord {
    fn from(email: InEmail) -> Self {
        Self::Incoming(email)
    }
}

impl From<OutEmail> for EmailRecord {
    fn from(email: OutEmail) -> Self {
        Self::Outgoing(email)
    }
}
