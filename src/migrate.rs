use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on `pool` if it does not exist yet.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS headlines (
            hash TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            domain TEXT NOT NULL,
            source TEXT,
            publish_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            content_path TEXT,
            strategy TEXT,
            crawled_at INTEGER NOT NULL,
            fetched_at INTEGER,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            CHECK (status IN ('pending', 'fetched', 'rejected', 'failed')),
            CHECK ((status = 'fetched') = (content_path IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_headlines_status ON headlines(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_headlines_publish_at ON headlines(publish_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_headlines_domain ON headlines(domain)")
        .execute(pool)
        .await?;

    Ok(())
}
