//! The archive loop.
//!
//! One [`Archiver`] owns the store, the seen set and the rate limiter and
//! drives a crawl cycle every `crawl.interval_secs`:
//!
//! 1. work through records left pending or retryable by earlier cycles,
//! 2. fetch the listing (a failure skips the rest of the cycle),
//! 3. insert unseen headlines as `pending` (or `rejected`) and work through
//!    the new ones,
//! 4. resolve content with the primary strategy, falling back to the
//!    secondary one on any failure,
//! 5. write the content file, then mark the record `fetched`,
//! 6. run the retention sweep.
//!
//! Every outbound request is gated on the rate limiter for the host it
//! contacts. A content request whose host is not ready defers the record to
//! a later cycle; if the primary strategy already failed, the record resumes
//! at the fallback. The listing request waits for its host instead.
//!
//! Shutdown is cooperative. The [`ShutdownSignal`] is checked at the top
//! of each cycle and before each item; an in-flight fetch gets
//! `crawl.shutdown_grace_secs` to finish and is otherwise dropped, leaving
//! its record untouched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use globset::GlobSet;
use serde::Serialize;

use crate::config::Config;
use crate::connector_feed::FeedStrategy;
use crate::connector_listing::FinvizListing;
use crate::connector_render::RenderStrategy;
use crate::content::{build_markdown_document, deterministic_filename, ensure_content_dir, ContentWriter};
use crate::dedup::{content_hash, normalize_title, SeenSet};
use crate::error::ArchiveError;
use crate::fetch::{FetchSettings, HttpFetcher};
use crate::models::{ArticleContent, FetchStatus, Headline, HeadlineRecord, Strategy};
use crate::rate_limit::DomainRateLimiter;
use crate::retention::{self, SweepReport};
use crate::shutdown::ShutdownSignal;
use crate::store::{SqliteStore, Store};
use crate::traits::{ContentStrategy, ListingSource};

/// Counters for one crawl cycle, logged at the end of the cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub listed: usize,
    pub new: usize,
    pub rejected: usize,
    pub skipped_seen: usize,
    /// Unseen headlines already older than the retention window.
    pub stale: usize,
    /// Headlines whose title normalizes to nothing.
    pub ignored: usize,
    pub deferred: usize,
    pub fetched: usize,
    pub failed: usize,
    /// In-flight fetches dropped after the shutdown grace period.
    pub abandoned: usize,
    pub storage_errors: usize,
    pub listing_failed: bool,
    pub cancelled: bool,
    pub sweep: Option<SweepReport>,
}

/// Every strategy attempt that failed for one record, in order.
#[derive(Debug)]
pub struct FetchFailure {
    pub attempts: Vec<(Strategy, ArchiveError)>,
}

impl FetchFailure {
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|(strategy, err)| format!("{}: {}", strategy, err))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Kind of the last error, for logs.
    pub fn kind(&self) -> &'static str {
        self.attempts
            .last()
            .map(|(_, err)| err.kind())
            .unwrap_or("network")
    }
}

async fn attempt(
    strategy: &dyn ContentStrategy,
    record: &HeadlineRecord,
    limit: Duration,
) -> Result<ArticleContent, ArchiveError> {
    match tokio::time::timeout(limit, strategy.fetch_content(record)).await {
        Ok(result) => result,
        Err(_) => Err(ArchiveError::Network(format!(
            "timed out after {}s",
            limit.as_secs()
        ))),
    }
}

/// Outcome of working one record.
enum ItemOutcome {
    Done(Result<ArticleContent, FetchFailure>),
    /// The host for `strategy` is inside its rate-limit interval.
    Deferred { domain: String, strategy: Strategy },
    /// Shutdown cut the fetch off.
    Abandoned,
}

pub struct Archiver {
    config: Config,
    store: Arc<dyn Store>,
    listing: Box<dyn ListingSource>,
    primary: Box<dyn ContentStrategy>,
    fallback: Option<Box<dyn ContentStrategy>>,
    seen: SeenSet,
    limiter: DomainRateLimiter,
    writer: ContentWriter,
    skip_urls: GlobSet,
    cancel: ShutdownSignal,
    /// Primary-strategy errors of records whose fallback was deferred.
    awaiting_fallback: HashMap<String, ArchiveError>,
}

impl Archiver {
    /// Check the content directory and rebuild the seen set from the store.
    /// Either failing is a startup error.
    pub async fn new(
        config: Config,
        store: Arc<dyn Store>,
        listing: Box<dyn ListingSource>,
        primary: Box<dyn ContentStrategy>,
        fallback: Option<Box<dyn ContentStrategy>>,
        cancel: ShutdownSignal,
    ) -> Result<Self, ArchiveError> {
        ensure_content_dir(&config.storage.content_dir)?;
        let seen = SeenSet::rebuild(store.as_ref())
            .await
            .map_err(ArchiveError::storage)?;
        let skip_urls = config.skip_url_set()?;
        let limiter = DomainRateLimiter::from_config(
            config.rate_limit.default_interval_secs,
            &config.rate_limit.domains,
        );
        let writer = ContentWriter::new(config.storage.content_dir.clone());

        tracing::info!(
            known_headlines = seen.len(),
            content_dir = %config.storage.content_dir.display(),
            "archiver ready"
        );

        Ok(Self {
            config,
            store,
            listing,
            primary,
            fallback,
            seen,
            limiter,
            writer,
            skip_urls,
            cancel,
            awaiting_fallback: HashMap::new(),
        })
    }

    /// Production wiring: SQLite store, Finviz listing, render strategy with
    /// feed fallback.
    pub async fn from_config(config: Config, cancel: ShutdownSignal) -> Result<Self, ArchiveError> {
        let store = SqliteStore::open(&config)
            .await
            .map_err(ArchiveError::storage)?;
        let fetcher = HttpFetcher::new(&FetchSettings::from_config(&config))?;
        let listing = FinvizListing::new(&config, fetcher.clone())?;
        let primary = RenderStrategy::new(&config, fetcher.clone());
        let fallback = FeedStrategy::new(&config, fetcher);
        Self::new(
            config,
            Arc::new(store),
            Box::new(listing),
            Box::new(primary),
            Some(Box::new(fallback)),
            cancel,
        )
        .await
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Run cycles until cancelled (or once), then close the store.
    pub async fn run(&mut self, once: bool) {
        tracing::info!(
            listing = self.listing.name(),
            interval_secs = self.config.crawl.interval_secs,
            retention_days = self.config.crawl.retention_days,
            "archive loop started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let report = self.run_cycle().await;
            tracing::info!(
                listed = report.listed,
                new = report.new,
                rejected = report.rejected,
                skipped_seen = report.skipped_seen,
                stale = report.stale,
                ignored = report.ignored,
                deferred = report.deferred,
                fetched = report.fetched,
                failed = report.failed,
                abandoned = report.abandoned,
                storage_errors = report.storage_errors,
                swept = report.sweep.as_ref().map_or(0, |s| s.removed),
                "cycle finished"
            );
            if once || report.cancelled {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.store.close().await;
        tracing::info!("archive loop stopped");
    }

    /// One crawl cycle. Never fails as a whole; problems are counted in the
    /// report and logged.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        self.primary.reset();
        if let Some(fallback) = &self.fallback {
            fallback.reset();
        }

        match self.store.pending_work(self.config.crawl.max_retries).await {
            Ok(carried) => self.process_records(carried, &mut report).await,
            Err(err) => {
                report.storage_errors += 1;
                tracing::warn!(kind = "storage", error = %err, "failed to load pending work");
            }
        }
        if report.cancelled {
            return report;
        }

        if !self.wait_for_listing_slot().await {
            report.cancelled = true;
            return report;
        }
        let listing = tokio::select! {
            result = self.listing.fetch_listing() => Some(result),
            _ = self.cancel.cancelled() => None,
        };
        match listing {
            None => {
                report.cancelled = true;
                return report;
            }
            Some(Ok(headlines)) => {
                report.listed = headlines.len();
                let fresh = self.intake(&headlines, &mut report).await;
                self.process_records(fresh, &mut report).await;
            }
            Some(Err(err)) => {
                tracing::warn!(
                    kind = err.kind(),
                    listing = self.listing.name(),
                    error = %err,
                    "listing fetch failed, skipping cycle"
                );
                report.listing_failed = true;
            }
        }

        if report.cancelled {
            return report;
        }

        match retention::sweep(
            self.store.as_ref(),
            self.writer.dir(),
            self.config.crawl.retention_days,
            Utc::now(),
        )
        .await
        {
            Ok(sweep) => {
                for hash in &sweep.removed_hashes {
                    self.seen.remove(hash);
                    self.awaiting_fallback.remove(hash);
                }
                report.sweep = Some(sweep);
            }
            Err(err) => {
                report.storage_errors += 1;
                tracing::warn!(kind = "storage", error = %err, "retention sweep failed");
            }
        }

        report
    }

    fn rejection_reason(&self, url: &str) -> Option<String> {
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Some("unsupported url".to_string()),
        }
        if self.skip_urls.is_match(url) {
            return Some("url matches crawl.skip_url_globs".to_string());
        }
        None
    }

    /// Wait until the listing host may be requested. `false` if shutdown
    /// was requested first.
    async fn wait_for_listing_slot(&mut self) -> bool {
        let Some(domain) = self.listing.request_domain() else {
            return true;
        };
        loop {
            let wait = self.limiter.ready_in(&domain, Instant::now());
            if wait.is_zero() && self.limiter.try_acquire(&domain, Instant::now()) {
                return true;
            }
            tracing::debug!(domain = %domain, wait_ms = wait.as_millis() as u64, "listing waiting for rate limit");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => return false,
            }
        }
    }

    /// Store unseen headlines and return the ones that need fetching.
    async fn intake(&mut self, headlines: &[Headline], report: &mut CycleReport) -> Vec<HeadlineRecord> {
        let now = Utc::now();
        let stale_before = retention::retention_cutoff(now, self.config.crawl.retention_days);
        let mut fresh = Vec::new();

        for headline in headlines {
            if normalize_title(&headline.title).is_empty() {
                report.ignored += 1;
                continue;
            }
            let hash = content_hash(&headline.title);
            if self.seen.contains(&hash) {
                report.skipped_seen += 1;
                continue;
            }
            if stale_before.is_some_and(|cutoff| headline.publish_at < cutoff) {
                report.stale += 1;
                continue;
            }

            let mut record = HeadlineRecord::observe(headline, now);
            let rejection = self.rejection_reason(&record.url);
            if let Some(reason) = &rejection {
                record.status = FetchStatus::Rejected;
                record.last_error = Some(reason.clone());
            }

            match self.store.insert_new(&record).await {
                Ok(inserted) => {
                    self.seen.insert(hash);
                    if !inserted {
                        continue;
                    }
                    if let Some(reason) = rejection {
                        report.rejected += 1;
                        tracing::debug!(hash = %record.hash, url = %record.url, reason = %reason, "headline rejected");
                    } else {
                        report.new += 1;
                        tracing::debug!(hash = %record.hash, title = %record.title, "new headline");
                        fresh.push(record);
                    }
                }
                Err(err) => {
                    report.storage_errors += 1;
                    tracing::warn!(kind = "storage", hash = %record.hash, error = %err, "failed to record headline");
                }
            }
        }
        fresh
    }

    async fn process_records(&mut self, records: Vec<HeadlineRecord>, report: &mut CycleReport) {
        for record in records {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.fetch_record(&record).await {
                ItemOutcome::Done(Ok(content)) => self.record_success(record, content, report).await,
                ItemOutcome::Done(Err(failure)) => self.record_failure(record, failure, report).await,
                ItemOutcome::Deferred { domain, strategy } => {
                    report.deferred += 1;
                    tracing::debug!(
                        hash = %record.hash,
                        domain = %domain,
                        strategy = %strategy,
                        ready_in_ms = self.limiter.ready_in(&domain, Instant::now()).as_millis() as u64,
                        "deferred by rate limit"
                    );
                }
                ItemOutcome::Abandoned => {
                    report.abandoned += 1;
                    report.cancelled = true;
                    tracing::warn!(hash = %record.hash, url = %record.url, "in-flight fetch abandoned at shutdown");
                    break;
                }
            }
        }
    }

    /// Run the primary strategy, then the fallback if the primary failed.
    /// Each request first takes a rate-limit slot for the host it contacts.
    async fn fetch_record(&mut self, record: &HeadlineRecord) -> ItemOutcome {
        let limit = self.config.fetch_timeout();
        let mut attempts = Vec::new();

        match self.awaiting_fallback.remove(&record.hash) {
            Some(primary_error) => attempts.push((self.primary.strategy(), primary_error)),
            None => {
                if let Some(domain) = self.primary.request_domain(record) {
                    if !self.limiter.try_acquire(&domain, Instant::now()) {
                        return ItemOutcome::Deferred {
                            domain,
                            strategy: self.primary.strategy(),
                        };
                    }
                }
                match self.race_shutdown(attempt(self.primary.as_ref(), record, limit), record).await {
                    None => return ItemOutcome::Abandoned,
                    Some(Ok(content)) => return ItemOutcome::Done(Ok(content)),
                    Some(Err(err)) => {
                        tracing::debug!(
                            hash = %record.hash,
                            strategy = %self.primary.strategy(),
                            kind = err.kind(),
                            error = %err,
                            "strategy failed"
                        );
                        attempts.push((self.primary.strategy(), err));
                    }
                }
            }
        }

        let Some(fallback) = self.fallback.as_deref() else {
            return ItemOutcome::Done(Err(FetchFailure { attempts }));
        };
        if self.cancel.is_cancelled() {
            return ItemOutcome::Abandoned;
        }
        if let Some(domain) = fallback.request_domain(record) {
            if !self.limiter.try_acquire(&domain, Instant::now()) {
                if let Some((_, primary_error)) = attempts.pop() {
                    self.awaiting_fallback.insert(record.hash.clone(), primary_error);
                }
                return ItemOutcome::Deferred {
                    domain,
                    strategy: fallback.strategy(),
                };
            }
        }
        match self.race_shutdown(attempt(fallback, record, limit), record).await {
            None => ItemOutcome::Abandoned,
            Some(Ok(content)) => ItemOutcome::Done(Ok(content)),
            Some(Err(err)) => {
                tracing::debug!(
                    hash = %record.hash,
                    strategy = %fallback.strategy(),
                    kind = err.kind(),
                    error = %err,
                    "strategy failed"
                );
                attempts.push((fallback.strategy(), err));
                ItemOutcome::Done(Err(FetchFailure { attempts }))
            }
        }
    }

    /// Await `fetch`, racing the shutdown signal. After cancellation the
    /// fetch gets the shutdown grace period; `None` means it was dropped.
    async fn race_shutdown<F: Future>(&self, fetch: F, record: &HeadlineRecord) -> Option<F::Output> {
        tokio::pin!(fetch);

        tokio::select! {
            result = &mut fetch => Some(result),
            _ = self.cancel.cancelled() => {
                let grace = self.config.shutdown_grace();
                tracing::info!(
                    hash = %record.hash,
                    grace_secs = grace.as_secs(),
                    "shutdown requested, waiting for in-flight fetch"
                );
                tokio::time::timeout(grace, &mut fetch).await.ok()
            }
        }
    }

    async fn record_success(
        &self,
        record: HeadlineRecord,
        content: ArticleContent,
        report: &mut CycleReport,
    ) {
        let fetched_at = Utc::now();
        let filename = deterministic_filename(record.source_label(), &record.title, &record.hash);
        let document = build_markdown_document(&record, &content, fetched_at);

        if let Err(err) = self.writer.write(&filename, &document) {
            // Record stays as it was and is retried next cycle.
            report.storage_errors += 1;
            tracing::warn!(kind = "storage", hash = %record.hash, file = %filename, error = %err, "failed to write content file");
            return;
        }

        let updated = HeadlineRecord {
            status: FetchStatus::Fetched,
            content_path: Some(filename.clone()),
            strategy: Some(content.strategy),
            fetched_at: Some(fetched_at),
            last_error: None,
            ..record
        };
        match self.store.upsert(&updated).await {
            Ok(()) => {
                report.fetched += 1;
                tracing::info!(
                    hash = %updated.hash,
                    domain = %updated.domain,
                    strategy = %content.strategy,
                    file = %filename,
                    "article archived"
                );
            }
            Err(err) => {
                report.storage_errors += 1;
                tracing::warn!(kind = "storage", hash = %updated.hash, error = %err, "failed to mark record fetched");
                if let Err(err) = self.writer.remove(&filename) {
                    tracing::warn!(kind = "storage", file = %filename, error = %err, "failed to remove unreferenced content file");
                }
            }
        }
    }

    async fn record_failure(&self, record: HeadlineRecord, failure: FetchFailure, report: &mut CycleReport) {
        let updated = HeadlineRecord {
            status: FetchStatus::Failed,
            content_path: None,
            strategy: None,
            retry_count: record.retry_count + 1,
            last_error: Some(failure.summary()),
            ..record
        };
        match self.store.upsert(&updated).await {
            Ok(()) => {
                report.failed += 1;
                let exhausted = updated.retry_count >= self.config.crawl.max_retries as i64;
                tracing::warn!(
                    kind = failure.kind(),
                    hash = %updated.hash,
                    url = %updated.url,
                    attempt = updated.retry_count,
                    exhausted,
                    error = %failure.summary(),
                    "content fetch failed"
                );
            }
            Err(err) => {
                report.storage_errors += 1;
                tracing::warn!(kind = "storage", hash = %updated.hash, error = %err, "failed to record fetch failure");
            }
        }
    }
}
