//! Core data models used throughout the archiver.
//!
//! A [`Headline`] is what the listing page shows; a [`HeadlineRecord`] is
//! what the store keeps about it; an [`ArticleContent`] is what a content
//! strategy resolves for it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dedup::content_hash;

/// Lifecycle of a record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Observed, content not resolved yet (new or deferred by the rate limiter).
    Pending,
    /// Content resolved and written to disk.
    Fetched,
    /// Excluded by URL rules; never fetched.
    Rejected,
    /// Every strategy failed on the last attempt.
    Failed,
}

impl FetchStatus {
    pub const ALL: [FetchStatus; 4] = [
        FetchStatus::Pending,
        FetchStatus::Fetched,
        FetchStatus::Rejected,
        FetchStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Pending => "pending",
            FetchStatus::Fetched => "fetched",
            FetchStatus::Rejected => "rejected",
            FetchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FetchStatus::Pending),
            "fetched" => Ok(FetchStatus::Fetched),
            "rejected" => Ok(FetchStatus::Rejected),
            "failed" => Ok(FetchStatus::Failed),
            other => Err(format!("unknown fetch status: '{}'", other)),
        }
    }
}

/// Which strategy produced a record's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Rendered page extraction.
    Render,
    /// Syndication feed lookup.
    Feed,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Render => "render",
            Strategy::Feed => "feed",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "render" => Ok(Strategy::Render),
            "feed" => Ok(Strategy::Feed),
            other => Err(format!("unknown strategy: '{}'", other)),
        }
    }
}

/// A single entry parsed from the upstream listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub url: String,
    /// Publisher label shown next to the headline, when the listing has one.
    pub source: Option<String>,
    pub publish_at: DateTime<Utc>,
}

/// A headline as persisted in the store, keyed by `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadlineRecord {
    pub hash: String,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub source: Option<String>,
    pub publish_at: DateTime<Utc>,
    pub status: FetchStatus,
    /// File name relative to the content directory. Set iff `status` is `fetched`.
    pub content_path: Option<String>,
    pub strategy: Option<Strategy>,
    pub crawled_at: DateTime<Utc>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

impl HeadlineRecord {
    /// Build a fresh `pending` record for a headline first seen at `now`.
    pub fn observe(headline: &Headline, now: DateTime<Utc>) -> Self {
        Self {
            hash: content_hash(&headline.title),
            title: headline.title.clone(),
            url: headline.url.clone(),
            domain: domain_of(&headline.url).unwrap_or_default(),
            source: headline.source.clone(),
            publish_at: headline.publish_at,
            status: FetchStatus::Pending,
            content_path: None,
            strategy: None,
            crawled_at: now,
            fetched_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Label used to name content files: the publisher if known, else the domain.
    pub fn source_label(&self) -> &str {
        self.source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.domain)
    }
}

/// Content resolved for a record by one of the strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleContent {
    pub title: Option<String>,
    pub markdown: String,
    pub strategy: Strategy,
}

/// Lower-cased host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
