//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for email records and
//! watermark state. The trait-based design allows swapping between in-memory
//! and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{RecordCounts, RecordStore, StateStore};
