//! Ingest crate - Business logic for DirectAdmin email log ingestion
//!
//! This crate provides platform-independent ingestion functionality including:
//! - Domain models (EmailRecord, DeliveryState, Watermark)
//! - DirectAdmin API client and log entry normalization
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Watermark-driven incremental sync engine
//! - Operator alerts (Discord webhook)
//! - Status report for the inspection endpoint
//!
//! All I/O is blocking; async hosts run the sync engine on a blocking pool.

pub mod config;
pub mod directadmin;
pub mod inspect;
pub mod models;
pub mod notify;
pub mod storage;
pub mod sync;

pub use crate::config::IngestConfig;
pub use directadmin::{DirectAdminClient, DirectAdminCredentials, LogQuery, LogSource, api::{EmailLogEntry, EmailLogResponse}};
pub use inspect::{Route, StatusReport, route};
pub use models::{DeliveryState, Direction, EmailRecord, InEmail, OutEmail, Watermark};
pub use notify::{Alerter, DiscordNotifier, Notifier};
pub use storage::{InMemoryStore, RecordCounts, RecordStore, SqliteStore, StateStore};
pub use sync::{
    // Sync execution
    Ingester, SyncError, SyncOptions, SyncStats,
    // Window selection
    FetchWindow, WatermarkSource,
};
