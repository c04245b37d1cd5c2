//! Domain models for email log entities

mod delivery;
mod record;
mod watermark;

pub use delivery::{DeliveryState, Direction};
pub use record::{EmailRecord, InEmail, OutEmail};
pub use watermark::{Watermark, format_timestamp, parse_timestamp};
