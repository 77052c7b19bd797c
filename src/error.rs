//! Error kinds surfaced by the archive loop.
//!
//! | Kind | Raised by | Effect |
//! |------|-----------|--------|
//! | [`ArchiveError::Network`] | listing or content fetch | cycle skipped / item retried later |
//! | [`ArchiveError::ContentQuality`] | bot wall, paywall, empty body | fallback strategy, then `failed` |
//! | [`ArchiveError::Storage`] | SQLite, content directory | fatal at startup, logged mid-run |
//! | [`ArchiveError::Config`] | config file, CLI flags | fatal before the loop starts |

use thiserror::Error;

use crate::extract::QualityIssue;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("network error: {0}")]
    Network(String),

    #[error("content quality: {0}")]
    ContentQuality(QualityIssue),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Short label used as the `kind` field in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::Network(_) => "network",
            ArchiveError::ContentQuality(_) => "content_quality",
            ArchiveError::Storage(_) => "storage",
            ArchiveError::Config(_) => "config",
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for ArchiveError {
    fn from(err: sqlx::Error) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}

impl From<QualityIssue> for ArchiveError {
    fn from(issue: QualityIssue) -> Self {
        ArchiveError::ContentQuality(issue)
    }
}
