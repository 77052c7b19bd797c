//! SQLite-backed [`Store`] implementation over the `headlines` table.
//!
//! Timestamps are stored as unix seconds (`INTEGER`), statuses and
//! strategies as their lowercase names.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{RecordFilter, Store};
use crate::config::Config;
use crate::models::{FetchStatus, HeadlineRecord, Strategy};
use crate::{db, migrate};

const COLUMNS: &str = "hash, title, url, domain, source, publish_at, status, content_path, \
                       strategy, crawled_at, fetched_at, retry_count, last_error";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect read-write and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", secs))
}

pub(crate) fn record_from_row(row: &SqliteRow) -> Result<HeadlineRecord> {
    let status: String = row.get("status");
    let strategy: Option<String> = row.get("strategy");
    let fetched_at: Option<i64> = row.get("fetched_at");
    Ok(HeadlineRecord {
        hash: row.get("hash"),
        title: row.get("title"),
        url: row.get("url"),
        domain: row.get("domain"),
        source: row.get("source"),
        publish_at: from_ts(row.get("publish_at"))?,
        status: status.parse::<FetchStatus>().map_err(|e| anyhow!(e))?,
        content_path: row.get("content_path"),
        strategy: strategy
            .map(|s| s.parse::<Strategy>().map_err(|e| anyhow!(e)))
            .transpose()?,
        crawled_at: from_ts(row.get("crawled_at"))?,
        fetched_at: fetched_at.map(from_ts).transpose()?,
        retry_count: row.get("retry_count"),
        last_error: row.get("last_error"),
    })
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    record: &'q HeadlineRecord,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&record.hash)
        .bind(&record.title)
        .bind(&record.url)
        .bind(&record.domain)
        .bind(&record.source)
        .bind(ts(record.publish_at))
        .bind(record.status.as_str())
        .bind(&record.content_path)
        .bind(record.strategy.map(|s| s.as_str()))
        .bind(ts(record.crawled_at))
        .bind(record.fetched_at.map(ts))
        .bind(record.retry_count)
        .bind(&record.last_error)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_new(&self, record: &HeadlineRecord) -> Result<bool> {
        let sql = format!(
            "INSERT INTO headlines ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(hash) DO NOTHING",
            COLUMNS
        );
        let result = bind_record(sqlx::query(&sql), record)
            .execute(&self.pool)
            .await
            .with_context(|| format!("inserting headline {}", record.hash))?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert(&self, record: &HeadlineRecord) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO headlines ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                domain = excluded.domain,
                source = excluded.source,
                publish_at = excluded.publish_at,
                status = excluded.status,
                content_path = excluded.content_path,
                strategy = excluded.strategy,
                fetched_at = excluded.fetched_at,
                retry_count = excluded.retry_count,
                last_error = excluded.last_error
            "#,
            COLUMNS
        );
        bind_record(sqlx::query(&sql), record)
            .execute(&self.pool)
            .await
            .with_context(|| format!("upserting headline {}", record.hash))?;
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<HeadlineRecord>> {
        let sql = format!("SELECT {} FROM headlines WHERE hash = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn all_hashes(&self) -> Result<Vec<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM headlines")
            .fetch_all(&self.pool)
            .await?;
        Ok(hashes)
    }

    async fn pending_work(&self, max_retries: u32) -> Result<Vec<HeadlineRecord>> {
        let sql = format!(
            "SELECT {} FROM headlines \
             WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?) \
             ORDER BY crawled_at ASC, publish_at ASC, hash ASC",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(max_retries as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<HeadlineRecord>> {
        let sql = format!("SELECT {} FROM headlines WHERE publish_at < ?", COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(ts(cutoff))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn delete(&self, hashes: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for hash in hashes {
            removed += sqlx::query("DELETE FROM headlines WHERE hash = ?")
                .bind(hash)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<HeadlineRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM headlines WHERE 1 = 1", COLUMNS));
        if let Some(since) = filter.since {
            qb.push(" AND publish_at >= ").push_bind(ts(since));
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY publish_at DESC, hash ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn content_paths(&self) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT content_path FROM headlines WHERE content_path IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
