//! Storage abstraction for headline records.
//!
//! The archive loop talks to the [`Store`] trait only, so the same cycle
//! logic runs against SQLite in production and [`InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FetchStatus, HeadlineRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Selection used by `list` and `export`.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Inclusive lower bound on `publish_at`.
    pub since: Option<DateTime<Utc>>,
    pub status: Option<FetchStatus>,
    pub limit: Option<i64>,
}

impl RecordFilter {
    pub(crate) fn matches(&self, record: &HeadlineRecord) -> bool {
        self.since.map_or(true, |since| record.publish_at >= since)
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Persistent record store, keyed by content hash.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_new`](Store::insert_new) | Insert unless the hash exists |
/// | [`upsert`](Store::upsert) | Insert or overwrite by hash |
/// | [`get`](Store::get) | Fetch one record |
/// | [`all_hashes`](Store::all_hashes) | Every hash, for rebuilding the seen set |
/// | [`pending_work`](Store::pending_work) | Records the next cycle should fetch |
/// | [`expired`](Store::expired) | Records published before a cutoff |
/// | [`delete`](Store::delete) | Remove records by hash |
/// | [`list`](Store::list) | Filtered listing, newest first |
/// | [`content_paths`](Store::content_paths) | Content files the store references |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `record` unless its hash is already stored.
    ///
    /// Returns `true` if a row was written.
    async fn insert_new(&self, record: &HeadlineRecord) -> Result<bool>;

    /// Insert or replace every column of the record with this hash.
    async fn upsert(&self, record: &HeadlineRecord) -> Result<()>;

    async fn get(&self, hash: &str) -> Result<Option<HeadlineRecord>>;

    async fn all_hashes(&self) -> Result<Vec<String>>;

    /// `pending` records plus `failed` ones with `retry_count < max_retries`,
    /// oldest observation first.
    async fn pending_work(&self, max_retries: u32) -> Result<Vec<HeadlineRecord>>;

    /// Records whose `publish_at` is strictly before `cutoff`.
    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<HeadlineRecord>>;

    /// Delete the given hashes atomically. Returns the number of rows removed.
    async fn delete(&self, hashes: &[String]) -> Result<u64>;

    /// Records matching `filter`, newest `publish_at` first.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<HeadlineRecord>>;

    async fn content_paths(&self) -> Result<Vec<String>>;

    /// Flush and release the backend. Further calls are an error.
    async fn close(&self) {}
}
