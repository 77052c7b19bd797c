//! Archive statistics.
//!
//! Summarizes what the archive holds: record counts per status, the publish
//! time range, recent activity, a per-domain breakdown and the content files
//! on disk. Used by `harc stats` to confirm the daemon is making progress.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::Row;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::models::FetchStatus;

#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub records: i64,
    pub fetched: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub total: i64,
    pub pending: i64,
    pub fetched: i64,
    pub rejected: i64,
    pub failed: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub last_24h: i64,
    pub files_on_disk: u64,
    pub total_size_mb: f64,
    pub db_size_bytes: u64,
    pub domains: Vec<DomainStats>,
}

/// Query the database and content directory.
pub async fn collect_stats(config: &Config) -> Result<ArchiveStats> {
    let pool = db::connect_read_only(config).await?;

    let status_rows = sqlx::query("SELECT status, COUNT(*) AS n FROM headlines GROUP BY status")
        .fetch_all(&pool)
        .await?;
    let mut counts = [0i64; 4];
    for row in &status_rows {
        let status: String = row.get("status");
        if let Ok(status) = status.parse::<FetchStatus>() {
            let idx = FetchStatus::ALL
                .iter()
                .position(|s| *s == status)
                .unwrap_or_default();
            counts[idx] = row.get("n");
        }
    }

    let range = sqlx::query(
        "SELECT MIN(publish_at) AS oldest, MAX(publish_at) AS newest, COUNT(*) AS total FROM headlines",
    )
    .fetch_one(&pool)
    .await?;
    let oldest: Option<i64> = range.get("oldest");
    let newest: Option<i64> = range.get("newest");
    let total: i64 = range.get("total");

    let day_ago = (Utc::now() - Duration::hours(24)).timestamp();
    let last_24h: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM headlines WHERE publish_at >= ?")
        .bind(day_ago)
        .fetch_one(&pool)
        .await?;

    let domain_rows = sqlx::query(
        r#"
        SELECT
            domain,
            COUNT(*) AS records,
            SUM(CASE WHEN status = 'fetched' THEN 1 ELSE 0 END) AS fetched,
            SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed
        FROM headlines
        GROUP BY domain
        ORDER BY records DESC, domain ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;
    let domains = domain_rows
        .iter()
        .map(|row| DomainStats {
            domain: row.get("domain"),
            records: row.get("records"),
            fetched: row.get("fetched"),
            failed: row.get("failed"),
        })
        .collect();

    pool.close().await;

    let (files_on_disk, total_bytes) = content_files(config);
    let db_size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(ArchiveStats {
        total,
        pending: counts[0],
        fetched: counts[1],
        rejected: counts[2],
        failed: counts[3],
        oldest: oldest.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        newest: newest.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        last_24h,
        files_on_disk,
        total_size_mb: (total_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        db_size_bytes,
        domains,
    })
}

/// Count and total size of `.md` files directly under the content directory.
fn content_files(config: &Config) -> (u64, u64) {
    let dir = &config.storage.content_dir;
    if !dir.is_dir() {
        return (0, 0);
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
        .fold((0, 0), |(n, bytes), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (n + 1, bytes + len)
        })
}

/// Run the stats command: print a summary table, or JSON with `json`.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let stats = collect_stats(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Headline Archive — Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.db_size_bytes));
    println!("  Content dir: {}", config.storage.content_dir.display());
    println!(
        "  Files:       {} ({:.2} MB)",
        stats.files_on_disk, stats.total_size_mb
    );
    println!();
    println!("  Total:       {}", stats.total);
    println!("  Fetched:     {}", stats.fetched);
    println!("  Pending:     {}", stats.pending);
    println!("  Failed:      {}", stats.failed);
    println!("  Rejected:    {}", stats.rejected);
    println!("  Last 24h:    {}", stats.last_24h);
    println!(
        "  Oldest:      {}",
        stats
            .oldest
            .map(|t| format_ts_relative(t.timestamp()))
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  Newest:      {}",
        stats
            .newest
            .map(|t| format_ts_relative(t.timestamp()))
            .unwrap_or_else(|| "-".to_string())
    );

    if !stats.domains.is_empty() {
        println!();
        println!("  By domain:");
        println!(
            "  {:<32} {:>8} {:>8} {:>8}",
            "DOMAIN", "RECORDS", "FETCHED", "FAILED"
        );
        println!("  {}", "-".repeat(60));
        for d in &stats.domains {
            println!(
                "  {:<32} {:>8} {:>8} {:>8}",
                d.domain, d.records, d.fetched, d.failed
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now().timestamp();
        assert_eq!(format_ts_relative(now - 10), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
