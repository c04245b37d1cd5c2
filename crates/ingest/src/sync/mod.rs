//! Sync engine for incremental email log ingestion
//!
//! Runs are safe to retry: a failed run never advances the watermark.

mod driver;
mod window;

pub use driver::{Ingester, SyncError, SyncOptions, SyncStats};
pub use window::{FetchWindow, WatermarkSource, is_time_ordered, next_watermark};
