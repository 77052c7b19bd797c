//! Retention sweep.
//!
//! Deletes records published before `now - retention_days` together with
//! their content files, then removes `.md` files in the content directory
//! that no record references (left behind by a crash between the file write
//! and the store update) and abandoned temp files from interrupted writes.
//! A retention of 0 keeps everything.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration as StdDuration, SystemTime};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::content::{ContentWriter, TEMP_FILE_PREFIX};
use crate::store::Store;

/// Temp files younger than this may belong to a write in progress.
const TEMP_FILE_MIN_AGE: StdDuration = StdDuration::from_secs(3600);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records deleted from the store.
    pub removed: u64,
    /// Content files deleted for those records.
    pub files_removed: u64,
    /// Unreferenced content files and stale temp files deleted.
    pub orphans_removed: u64,
    #[serde(skip)]
    pub removed_hashes: Vec<String>,
}

/// Oldest publish time kept, `None` when retention is off. A window reaching
/// past the earliest representable time keeps everything.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    if retention_days == 0 {
        return None;
    }
    Some(
        Duration::try_days(i64::from(retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

/// Run one sweep. Rows go first so a failure part-way leaves at worst an
/// orphan file, never a `fetched` record without its file.
pub async fn sweep(
    store: &dyn Store,
    content_dir: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let Some(cutoff) = retention_cutoff(now, retention_days) else {
        return Ok(report);
    };

    let expired = store.expired(cutoff).await?;
    if !expired.is_empty() {
        let hashes: Vec<String> = expired.iter().map(|r| r.hash.clone()).collect();
        report.removed = store.delete(&hashes).await?;
        report.removed_hashes = hashes;

        let writer = ContentWriter::new(content_dir.to_path_buf());
        for record in &expired {
            let Some(path) = record.content_path.as_deref() else {
                continue;
            };
            match writer.remove(path) {
                Ok(true) => report.files_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(kind = "storage", file = path, error = %e, "failed to remove content file")
                }
            }
        }
    }

    report.orphans_removed = prune_orphans(store, content_dir).await?;

    if report.removed > 0 || report.orphans_removed > 0 {
        tracing::info!(
            cutoff = %cutoff,
            removed = report.removed,
            files_removed = report.files_removed,
            orphans_removed = report.orphans_removed,
            "retention sweep"
        );
    }
    Ok(report)
}

fn is_stale_temp_file(name: &str, path: &Path) -> bool {
    if !name.starts_with(TEMP_FILE_PREFIX) {
        return false;
    }
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= TEMP_FILE_MIN_AGE)
}

async fn prune_orphans(store: &dyn Store, content_dir: &Path) -> Result<u64> {
    if !content_dir.is_dir() {
        return Ok(0);
    }
    let referenced: HashSet<String> = store.content_paths().await?.into_iter().collect();

    let mut removed = 0;
    for entry in WalkDir::new(content_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let orphan = if is_stale_temp_file(name, path) {
            true
        } else {
            path.extension().and_then(|e| e.to_str()) == Some("md") && !referenced.contains(name)
        };
        if !orphan {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(kind = "storage", file = %path.display(), error = %e, "failed to remove orphan file")
            }
        }
    }
    Ok(removed)
}
