//! Durable storage for ingestion outcomes.
//!
//! The [`ResultStore`] trait is the only shared mutable resource in the
//! pipeline. Implementations must accept concurrent writers without an
//! external lock and never interleave the fields of two records.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert`](ResultStore::insert) | Append a record; assigns `id` and `created_at` |
//! | [`recent_for_source`](ResultStore::recent_for_source) | N most recent records for one source |
//! | [`recent_problems`](ResultStore::recent_problems) | N most recent records whose status is not `ok` |
//! | [`status_counts`](ResultStore::status_counts) | Total records per status |
//!
//! "Most recent" means event timestamp descending, ties broken by the
//! store-assigned identifier descending.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewRecord, RecordStatus, StoredRecord};

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append one record. Records are never updated or deleted.
    async fn insert(&self, record: &NewRecord) -> Result<StoredRecord>;

    async fn recent_for_source(&self, source: &str, limit: usize) -> Result<Vec<StoredRecord>>;

    async fn recent_problems(&self, limit: usize) -> Result<Vec<StoredRecord>>;

    async fn status_counts(&self) -> Result<BTreeMap<RecordStatus, u64>>;
}
