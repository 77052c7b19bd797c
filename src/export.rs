//! Export archived headlines as JSON.
//!
//! Produces either a titles-only digest or full records with their article
//! content inlined, for feeding into downstream summarizers. Reads through a
//! `query_only` connection like the other query commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{FetchStatus, HeadlineRecord};
use crate::query::{hours_before, parse_since, read_content};
use crate::store::{RecordFilter, SqliteStore, Store};

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Only records published in the last N hours. Ignored with `since`.
    pub hours: Option<i64>,
    pub since: Option<String>,
    pub titles_only: bool,
    pub fetched_only: bool,
}

#[derive(Serialize)]
struct ExportData {
    exported_at: DateTime<Utc>,
    since: Option<DateTime<Utc>>,
    count: usize,
    records: Vec<ExportRecord>,
}

#[derive(Serialize)]
struct ExportRecord {
    title: String,
    url: String,
    domain: String,
    source: Option<String>,
    publish_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<FetchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Option<String>>,
}

impl ExportRecord {
    fn titles_only(record: HeadlineRecord) -> Self {
        Self {
            title: record.title,
            url: record.url,
            domain: record.domain,
            source: record.source,
            publish_at: record.publish_at,
            status: None,
            content: None,
        }
    }

    fn full(config: &Config, record: HeadlineRecord) -> Self {
        let content = read_content(config, &record);
        Self {
            status: Some(record.status),
            content: Some(content),
            ..Self::titles_only(record)
        }
    }
}

/// Export records as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, opts: &ExportOptions, output: Option<&Path>) -> Result<()> {
    let since = match (&opts.since, opts.hours) {
        (Some(raw), _) => Some(parse_since(raw, config.timezone()?)?),
        (None, Some(hours)) => Some(hours_before(Utc::now(), hours)?),
        (None, None) => None,
    };
    let filter = RecordFilter {
        since,
        status: opts.fetched_only.then_some(FetchStatus::Fetched),
        limit: None,
    };

    let pool = db::connect_read_only(config).await?;
    let store = SqliteStore::new(pool);
    let records = store.list(&filter).await?;
    store.close().await;

    let records: Vec<ExportRecord> = records
        .into_iter()
        .map(|r| {
            if opts.titles_only {
                ExportRecord::titles_only(r)
            } else {
                ExportRecord::full(config, r)
            }
        })
        .collect();

    let count = records.len();
    let data = ExportData {
        exported_at: Utc::now(),
        since,
        count,
        records,
    };
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} records to {}", count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
