//! `SqliteStore` against a real database file in a temp directory.

use chrono::{DateTime, Duration, TimeZone, Utc};
use headline_archiver::config::Config;
use headline_archiver::db;
use headline_archiver::models::{FetchStatus, Headline, HeadlineRecord, Strategy};
use headline_archiver::store::{RecordFilter, SqliteStore, Store};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.db.path = tmp.path().join("data").join("harc.sqlite");
    config.storage.content_dir = tmp.path().join("articles");
    config
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 18, 14, 30, 0).unwrap()
}

fn record(title: &str, url: &str, publish_offset_mins: i64) -> HeadlineRecord {
    let headline = Headline {
        title: title.to_string(),
        url: url.to_string(),
        source: Some("Reuters".to_string()),
        publish_at: base_time() + Duration::minutes(publish_offset_mins),
    };
    HeadlineRecord::observe(&headline, base_time() + Duration::hours(1))
}

fn fetched(mut record: HeadlineRecord, path: &str) -> HeadlineRecord {
    record.status = FetchStatus::Fetched;
    record.content_path = Some(path.to_string());
    record.strategy = Some(Strategy::Feed);
    record.fetched_at = Some(base_time() + Duration::hours(2));
    record
}

#[tokio::test]
async fn test_open_creates_database_and_schema() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = SqliteStore::open(&config).await.unwrap();
    assert!(config.db.path.exists());
    assert!(store.all_hashes().await.unwrap().is_empty());
    store.close().await;

    // Reopening an existing database is a no-op migration.
    let store = SqliteStore::open(&config).await.unwrap();
    assert!(store.all_hashes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_new_ignores_existing_hash() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let first = record("Fed holds rates", "https://reuters.com/a", 0);
    assert!(store.insert_new(&first).await.unwrap());

    let variant = record("FED holds rates!", "https://cnbc.com/b", 5);
    assert_eq!(variant.hash, first.hash);
    assert!(!store.insert_new(&variant).await.unwrap());

    let stored = store.get(&first.hash).await.unwrap().unwrap();
    assert_eq!(stored, first);
}

#[tokio::test]
async fn test_upsert_overwrites_all_columns() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let pending = record("Oil climbs", "https://reuters.com/oil", 0);
    store.insert_new(&pending).await.unwrap();

    let mut failed = pending.clone();
    failed.status = FetchStatus::Failed;
    failed.retry_count = 1;
    failed.last_error = Some("render: network error: timeout".to_string());
    store.upsert(&failed).await.unwrap();
    assert_eq!(store.get(&pending.hash).await.unwrap(), Some(failed));

    let done = fetched(pending.clone(), "reuters--oil-climbs--abcd1234.md");
    store.upsert(&done).await.unwrap();
    assert_eq!(store.get(&pending.hash).await.unwrap(), Some(done));
    assert_eq!(store.all_hashes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetched_status_requires_content_path() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let mut broken = record("Broken row", "https://reuters.com/x", 0);
    broken.status = FetchStatus::Fetched;
    assert!(store.upsert(&broken).await.is_err());

    let mut also_broken = record("Another broken row", "https://reuters.com/y", 0);
    also_broken.content_path = Some("stray.md".to_string());
    assert!(store.upsert(&also_broken).await.is_err());

    assert!(store.all_hashes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_work_selects_and_orders() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let later = record("Later story", "https://a.com/later", 30);
    let earlier = record("Earlier story", "https://a.com/earlier", 10);
    let mut retryable = record("Retryable", "https://a.com/retry", 20);
    retryable.status = FetchStatus::Failed;
    retryable.retry_count = 1;
    let mut exhausted = record("Exhausted", "https://a.com/exhausted", 0);
    exhausted.status = FetchStatus::Failed;
    exhausted.retry_count = 3;
    let mut rejected = record("Rejected", "https://a.com/video/1", 0);
    rejected.status = FetchStatus::Rejected;
    let done = fetched(record("Done", "https://a.com/done", 0), "done.md");

    for r in [&later, &earlier, &retryable, &exhausted, &rejected, &done] {
        store.upsert(r).await.unwrap();
    }

    let work = store.pending_work(3).await.unwrap();
    let titles: Vec<&str> = work.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Earlier story", "Retryable", "Later story"]);
}

#[tokio::test]
async fn test_expired_and_delete() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let old = record("Old", "https://a.com/old", -60 * 24 * 10);
    let new = record("New", "https://a.com/new", 0);
    store.upsert(&old).await.unwrap();
    store.upsert(&new).await.unwrap();

    let expired = store.expired(base_time() - Duration::days(7)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].hash, old.hash);

    let removed = store
        .delete(&[old.hash.clone(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.get(&old.hash).await.unwrap(), None);
    assert!(store.get(&new.hash).await.unwrap().is_some());
}

#[tokio::test]
async fn test_list_filters_newest_first() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(&tmp)).await.unwrap();

    let a = fetched(record("A", "https://a.com/a", 0), "a.md");
    let b = record("B", "https://a.com/b", 60);
    let c = fetched(record("C", "https://a.com/c", 120), "c.md");
    for r in [&a, &b, &c] {
        store.upsert(r).await.unwrap();
    }

    let all = store.list(&RecordFilter::default()).await.unwrap();
    let titles: Vec<&str> = all.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["C", "B", "A"]);

    let filter = RecordFilter {
        since: Some(base_time() + Duration::minutes(30)),
        status: Some(FetchStatus::Fetched),
        limit: None,
    };
    let recent_fetched = store.list(&filter).await.unwrap();
    assert_eq!(recent_fetched.len(), 1);
    assert_eq!(recent_fetched[0].title, "C");

    let limited = store
        .list(&RecordFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let mut paths = store.content_paths().await.unwrap();
    paths.sort();
    assert_eq!(paths, vec!["a.md".to_string(), "c.md".to_string()]);
}

#[tokio::test]
async fn test_read_only_connection_refuses_writes() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = SqliteStore::open(&config).await.unwrap();
    let row = record("Readable", "https://a.com/r", 0);
    store.upsert(&row).await.unwrap();
    store.close().await;

    let reader = SqliteStore::new(db::connect_read_only(&config).await.unwrap());
    assert_eq!(reader.get(&row.hash).await.unwrap(), Some(row.clone()));
    assert!(reader.delete(&[row.hash.clone()]).await.is_err());
    assert!(reader.get(&row.hash).await.unwrap().is_some());
}

#[tokio::test]
async fn test_read_only_connection_requires_existing_database() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let err = db::connect_read_only(&config).await.unwrap_err();
    assert!(err.to_string().contains("database not found"));
    assert!(!config.db.path.exists());
}
