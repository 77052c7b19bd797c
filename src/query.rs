//! Read-only listing of archived headlines.
//!
//! Backs `harc list`. Records are selected by publish time (the last 12
//! hours unless `--hours` or `--since` says otherwise) and printed as JSON or
//! as one line per headline. The database is opened with `query_only`, so
//! nothing here can modify the archive.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::models::{FetchStatus, HeadlineRecord};
use crate::store::{RecordFilter, SqliteStore, Store};

pub const DEFAULT_WINDOW_HOURS: i64 = 12;

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub hours: Option<i64>,
    pub since: Option<String>,
    pub fetched_only: bool,
    pub titles_only: bool,
    pub with_content: bool,
    pub limit: Option<i64>,
}

/// A record plus, when requested, its content file (`null` if missing).
#[derive(Debug, Clone, Serialize)]
pub struct ListedRecord {
    #[serde(flatten)]
    pub record: HeadlineRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
struct ListQuery {
    since: DateTime<Utc>,
    status: Option<FetchStatus>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    query: ListQuery,
    count: usize,
    records: Vec<ListedRecord>,
}

/// Parse a `--since` value: RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`.
/// Forms without an offset are read in `tz`.
pub fn parse_since(raw: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    let Some(naive) = naive else {
        bail!("invalid --since '{}': expected RFC 3339, 'YYYY-MM-DD HH:MM' or 'YYYY-MM-DD'", raw);
    };
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("'{}' does not exist in {}", raw, tz))
}

/// `hours` before `now`. Out-of-range values are an error rather than a
/// panic.
pub fn hours_before(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(hours)
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("--hours {} is out of range", hours))
}

/// Lower bound of the listing window. `--since` wins over `--hours`.
pub fn window_start(
    since: Option<&str>,
    hours: Option<i64>,
    default_hours: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    match since {
        Some(raw) => parse_since(raw, tz),
        None => hours_before(now, hours.unwrap_or(default_hours)),
    }
}

/// Content of a record's file, or `None` if it has none or it is gone.
pub fn read_content(config: &Config, record: &HeadlineRecord) -> Option<String> {
    let name = record.content_path.as_deref()?;
    std::fs::read_to_string(config.storage.content_dir.join(name)).ok()
}

pub async fn list_records(config: &Config, opts: &ListOptions) -> Result<Vec<ListedRecord>> {
    let tz = config.timezone()?;
    let since = window_start(
        opts.since.as_deref(),
        opts.hours,
        DEFAULT_WINDOW_HOURS,
        tz,
        Utc::now(),
    )?;
    let filter = RecordFilter {
        since: Some(since),
        status: opts.fetched_only.then_some(FetchStatus::Fetched),
        limit: opts.limit,
    };

    let pool = db::connect_read_only(config).await?;
    let store = SqliteStore::new(pool);
    let records = store.list(&filter).await?;
    store.close().await;

    Ok(records
        .into_iter()
        .map(|record| {
            let content = opts.with_content.then(|| read_content(config, &record));
            ListedRecord { record, content }
        })
        .collect())
}

/// `[YYYY-MM-DD HH:MM] Title  (domain)` in the listing timezone.
pub fn format_title_line(record: &HeadlineRecord, tz: Tz) -> String {
    format!(
        "[{}] {}  ({})",
        record.publish_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        record.title,
        record.domain
    )
}

/// Run the list command and print to stdout.
pub async fn run_list(config: &Config, opts: &ListOptions) -> Result<()> {
    let tz = config.timezone()?;
    let records = list_records(config, opts).await?;

    if opts.titles_only {
        if records.is_empty() {
            eprintln!("No headlines in the selected window.");
        }
        for listed in &records {
            println!("{}", format_title_line(&listed.record, tz));
        }
        return Ok(());
    }

    let since = window_start(
        opts.since.as_deref(),
        opts.hours,
        DEFAULT_WINDOW_HOURS,
        tz,
        Utc::now(),
    )?;
    let response = ListResponse {
        query: ListQuery {
            since,
            status: opts.fetched_only.then_some(FetchStatus::Fetched),
        },
        count: records.len(),
        records,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since_forms() {
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(
            parse_since("2024-10-18T09:00:00Z", tz).unwrap(),
            Utc.with_ymd_and_hms(2024, 10, 18, 9, 0, 0).unwrap()
        );
        assert_eq!(
            parse_since("2024-10-18 09:00", tz).unwrap(),
            Utc.with_ymd_and_hms(2024, 10, 18, 13, 0, 0).unwrap()
        );
        assert_eq!(
            parse_since("2024-10-18", chrono_tz::UTC).unwrap(),
            Utc.with_ymd_and_hms(2024, 10, 18, 0, 0, 0).unwrap()
        );
        assert!(parse_since("last tuesday", tz).is_err());
    }

    #[test]
    fn test_window_defaults_to_twelve_hours() {
        let now = Utc.with_ymd_and_hms(2024, 10, 18, 12, 0, 0).unwrap();
        let start = window_start(None, None, DEFAULT_WINDOW_HOURS, chrono_tz::UTC, now).unwrap();
        assert_eq!(start, now - Duration::hours(12));
        let start = window_start(None, Some(48), DEFAULT_WINDOW_HOURS, chrono_tz::UTC, now).unwrap();
        assert_eq!(start, now - Duration::hours(48));
    }

    #[test]
    fn test_out_of_range_hours_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 10, 18, 12, 0, 0).unwrap();
        let err = window_start(None, Some(i64::MAX), DEFAULT_WINDOW_HOURS, chrono_tz::UTC, now)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(window_start(None, Some(3_000_000_000), DEFAULT_WINDOW_HOURS, chrono_tz::UTC, now).is_err());
    }
}
