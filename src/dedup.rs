//! Content-hash deduplication.
//!
//! Headlines are identified by the SHA-256 of their normalized title, so the
//! same story relisted with different casing, punctuation or tracking
//! parameters on its URL is archived once. The [`SeenSet`] mirrors the hashes
//! in the store and is rebuilt from it on startup.

use std::collections::HashSet;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::store::Store;

/// Lowercase, collapse every run of non-alphanumeric characters to one space, trim.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Hex SHA-256 of the normalized title.
pub fn content_hash(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory set of content hashes already present in the store.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    hashes: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hashes<I: IntoIterator<Item = String>>(hashes: I) -> Self {
        Self {
            hashes: hashes.into_iter().collect(),
        }
    }

    /// Reload from every hash the store holds, regardless of status.
    pub async fn rebuild(store: &dyn Store) -> Result<Self> {
        Ok(Self::from_hashes(store.all_hashes().await?))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Returns `true` if the hash was not present before.
    pub fn insert(&mut self, hash: String) -> bool {
        self.hashes.insert(hash)
    }

    pub fn remove(&mut self, hash: &str) -> bool {
        self.hashes.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
