//! In-memory [`Store`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RecordFilter, Store};
use crate::models::{FetchStatus, HeadlineRecord};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, HeadlineRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_new(&self, record: &HeadlineRecord) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.hash) {
            return Ok(false);
        }
        records.insert(record.hash.clone(), record.clone());
        Ok(true)
    }

    async fn upsert(&self, record: &HeadlineRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.hash.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<HeadlineRecord>> {
        Ok(self.records.read().unwrap().get(hash).cloned())
    }

    async fn all_hashes(&self) -> Result<Vec<String>> {
        Ok(self.records.read().unwrap().keys().cloned().collect())
    }

    async fn pending_work(&self, max_retries: u32) -> Result<Vec<HeadlineRecord>> {
        let records = self.records.read().unwrap();
        let mut work: Vec<HeadlineRecord> = records
            .values()
            .filter(|r| match r.status {
                FetchStatus::Pending => true,
                FetchStatus::Failed => r.retry_count < max_retries as i64,
                _ => false,
            })
            .cloned()
            .collect();
        work.sort_by(|a, b| {
            a.crawled_at
                .cmp(&b.crawled_at)
                .then(a.publish_at.cmp(&b.publish_at))
                .then(a.hash.cmp(&b.hash))
        });
        Ok(work)
    }

    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<HeadlineRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .values()
            .filter(|r| r.publish_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete(&self, hashes: &[String]) -> Result<u64> {
        let mut records = self.records.write().unwrap();
        Ok(hashes
            .iter()
            .filter(|h| records.remove(h.as_str()).is_some())
            .count() as u64)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<HeadlineRecord>> {
        let records = self.records.read().unwrap();
        let mut out: Vec<HeadlineRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.publish_at.cmp(&a.publish_at).then(a.hash.cmp(&b.hash)));
        if let Some(limit) = filter.limit {
            out.truncate(limit.max(0) as usize);
        }
        Ok(out)
    }

    async fn content_paths(&self) -> Result<Vec<String>> {
        let records = self.records.read().unwrap();
        Ok(records
            .values()
            .filter_map(|r| r.content_path.clone())
            .collect())
    }
}
