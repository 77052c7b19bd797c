//! TOML configuration parsing.
//!
//! Every key has a default, so a missing config file at the default location
//! yields a runnable configuration. CLI flags are applied on top through
//! [`ConfigOverrides`] before validation.
//!
//! ```toml
//! [db]
//! path = "./data/headlines.sqlite"
//!
//! [storage]
//! content_dir = "./data/articles"
//!
//! [crawl]
//! interval_secs = 300
//! retention_days = 7
//! timezone = "America/New_York"
//!
//! [rate_limit]
//! default_interval_secs = 5
//! domains = { "bloomberg.com" = 30 }
//!
//! [feeds]
//! "reuters.com" = "https://www.reuters.com/arc/outboundfeeds/rss/"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use crate::error::ArchiveError;

pub const DEFAULT_CONFIG_PATH: &str = "./config/harc.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub render: RenderConfig,
    /// Syndication feed URL per source domain, used by the fallback strategy.
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/headlines.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
        }
    }
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("./data/articles")
}

/// Where the headline listing lives and how its rows are laid out.
#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    #[serde(default = "default_listing_url")]
    pub url: String,
    #[serde(default = "default_row_selector")]
    pub row_selector: String,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default = "default_time_selector")]
    pub time_selector: String,
    #[serde(default = "default_source_selector")]
    pub source_selector: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            url: default_listing_url(),
            row_selector: default_row_selector(),
            link_selector: default_link_selector(),
            time_selector: default_time_selector(),
            source_selector: default_source_selector(),
        }
    }
}

fn default_listing_url() -> String {
    "https://finviz.com/news.ashx".to_string()
}
fn default_row_selector() -> String {
    "tr.news_table-row".to_string()
}
fn default_link_selector() -> String {
    "a.nn-tab-link".to_string()
}
fn default_time_selector() -> String {
    "td.news_date-cell".to_string()
}
fn default_source_selector() -> String {
    ".news_source".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum record age in days; 0 keeps everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// IANA zone the listing's wall-clock times are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_min_feed_chars")]
    pub min_feed_chars: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// URLs matching any of these globs are stored as `rejected`.
    #[serde(default)]
    pub skip_url_globs: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_days: default_retention_days(),
            timezone: default_timezone(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            max_retries: default_max_retries(),
            min_content_chars: default_min_content_chars(),
            min_feed_chars: default_min_feed_chars(),
            user_agent: default_user_agent(),
            skip_url_globs: Vec::new(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}
/// Upper bound for `crawl.retention_days` (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

fn default_retention_days() -> u32 {
    7
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_min_content_chars() -> usize {
    400
}
fn default_min_feed_chars() -> usize {
    80
}
fn default_user_agent() -> String {
    format!("headline-archiver/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_domain_interval_secs")]
    pub default_interval_secs: u64,
    /// Per-domain minimum spacing in seconds, overriding the default.
    #[serde(default)]
    pub domains: BTreeMap<String, u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_domain_interval_secs(),
            domains: BTreeMap::new(),
        }
    }
}

fn default_domain_interval_secs() -> u64 {
    5
}

/// Optional Browserless-compatible rendering service for strategy A.
/// Without an endpoint the article is fetched with a plain GET.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RenderConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Values given on the command line; each one replaces its config key.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub content_dir: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub retention_days: Option<u32>,
    pub timezone: Option<String>,
}

impl Config {
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.db_path {
            self.db.path = path;
        }
        if let Some(dir) = overrides.content_dir {
            self.storage.content_dir = dir;
        }
        if let Some(secs) = overrides.interval_secs {
            self.crawl.interval_secs = secs;
        }
        if let Some(days) = overrides.retention_days {
            self.crawl.retention_days = days;
        }
        if let Some(tz) = overrides.timezone {
            self.crawl.timezone = tz;
        }
    }

    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.crawl.interval_secs == 0 {
            return Err(ArchiveError::Config(
                "crawl.interval_secs must be > 0".to_string(),
            ));
        }
        if self.crawl.fetch_timeout_secs == 0 {
            return Err(ArchiveError::Config(
                "crawl.fetch_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.crawl.retention_days > MAX_RETENTION_DAYS {
            return Err(ArchiveError::Config(format!(
                "crawl.retention_days must be <= {} (0 keeps everything), got {}",
                MAX_RETENTION_DAYS, self.crawl.retention_days
            )));
        }
        if url::Url::parse(&self.listing.url).is_err() {
            return Err(ArchiveError::Config(format!(
                "listing.url is not a valid URL: '{}'",
                self.listing.url
            )));
        }
        for selector in [
            &self.listing.row_selector,
            &self.listing.link_selector,
            &self.listing.time_selector,
            &self.listing.source_selector,
        ] {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ArchiveError::Config(format!(
                    "invalid CSS selector in [listing]: '{}'",
                    selector
                )));
            }
        }
        self.timezone()?;
        self.skip_url_set()?;
        for (domain, feed_url) in &self.feeds {
            if url::Url::parse(feed_url).is_err() {
                return Err(ArchiveError::Config(format!(
                    "feeds.\"{}\" is not a valid URL: '{}'",
                    domain, feed_url
                )));
            }
        }
        if let Some(endpoint) = &self.render.endpoint {
            if url::Url::parse(endpoint).is_err() {
                return Err(ArchiveError::Config(format!(
                    "render.endpoint is not a valid URL: '{}'",
                    endpoint
                )));
            }
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ArchiveError> {
        self.crawl.timezone.parse::<Tz>().map_err(|_| {
            ArchiveError::Config(format!(
                "crawl.timezone is not a known IANA zone: '{}'",
                self.crawl.timezone
            ))
        })
    }

    pub fn skip_url_set(&self) -> Result<GlobSet, ArchiveError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.crawl.skip_url_globs {
            let glob = Glob::new(pattern).map_err(|e| {
                ArchiveError::Config(format!("invalid skip_url_globs entry '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| ArchiveError::Config(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.crawl.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl.fetch_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.crawl.shutdown_grace_secs)
    }
}

/// Load the config file at `path`, apply overrides and validate.
///
/// When `required` is false a missing file is treated as an empty one.
pub fn load_config(
    path: &Path,
    required: bool,
    overrides: ConfigOverrides,
) -> Result<Config, ArchiveError> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str::<Config>(&content).map_err(|e| {
            ArchiveError::Config(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?
    } else if required {
        return Err(ArchiveError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    } else {
        Config::default()
    };

    config.apply(overrides);
    config.validate()?;
    Ok(config)
}
