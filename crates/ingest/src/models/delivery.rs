//! Delivery state and direction of a log entry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery state reported by DirectAdmin for an entry or a single recipient
///
/// Parsed permissively: states we don't know about are kept verbatim in
/// [`DeliveryState::Other`] instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeliveryState {
    Delivered,
    Deferred,
    Failed,
    #[default]
    Unknown,
    Other(String),
}

impl DeliveryState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => "delivered",
            Self::Deferred => "deferred",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }

    /// Whether the state is not expected to change any more
    ///
    /// Deferred and unrecognized states are pending: the entry may be
    /// reported differently on a later fetch.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Unknown)
    }
}

impl From<&str> for DeliveryState {
    fn from(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "deferred" => Self::Deferred,
            "failed" => Self::Failed,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for DeliveryState {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<DeliveryState> for String {
    fn from(state: DeliveryState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a logged email relative to the mail server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Classify the raw `direction` field; anything but "in"/"out" is unrecognized
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some("in") => Some(Self::In),
            Some("out") => Some(Self::Out),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}
