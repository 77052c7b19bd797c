//! Seams between the archive loop and the outside world.
//!
//! The loop depends on two traits only: a [`ListingSource`] that yields the
//! current headlines, and a [`ContentStrategy`] that resolves the article
//! behind one headline. Production wiring uses the Finviz listing, the
//! render strategy as primary and the feed strategy as fallback; tests plug
//! in scripted fakes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────────────────────────────┐
//! │ListingSource │─────▶│              Archiver                │
//! │ (Finviz)     │      │  SeenSet ─ RateLimiter ─ Store       │
//! └──────────────┘      └──────┬──────────────────┬────────────┘
//!                              ▼                  ▼ on any error
//!                     ┌─────────────────┐ ┌─────────────────┐
//!                     │ ContentStrategy │ │ ContentStrategy │
//!                     │ A: render       │ │ B: feed         │
//!                     └─────────────────┘ └─────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::ArchiveError;
use crate::models::{ArticleContent, Headline, HeadlineRecord, Strategy};

/// Produces the headlines currently shown upstream.
///
/// Entries that cannot be parsed are dropped by the implementation; an
/// `Err` means the listing as a whole was unreachable and the cycle is
/// skipped.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use headline_archiver::error::ArchiveError;
/// use headline_archiver::models::Headline;
/// use headline_archiver::traits::ListingSource;
///
/// struct Fixed(Vec<Headline>);
///
/// #[async_trait]
/// impl ListingSource for Fixed {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn fetch_listing(&self) -> Result<Vec<Headline>, ArchiveError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Short label used in logs and `harc sources`.
    fn name(&self) -> &str;

    /// Host contacted by [`fetch_listing`](Self::fetch_listing), for the
    /// per-domain rate limiter. `None` when no network request is made.
    fn request_domain(&self) -> Option<String> {
        None
    }

    async fn fetch_listing(&self) -> Result<Vec<Headline>, ArchiveError>;
}

/// Resolves the full article for a stored record.
///
/// Implementations return [`ArchiveError::ContentQuality`] when they reached
/// the source but what came back is not an article, and
/// [`ArchiveError::Network`] when they could not reach it.
#[async_trait]
pub trait ContentStrategy: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Called once at the start of every cycle. Strategies that cache
    /// per-cycle data (such as downloaded feeds) drop it here.
    fn reset(&self) {}

    /// Host the next [`fetch_content`](Self::fetch_content) call for
    /// `record` will contact, or `None` if it needs no request (for example
    /// a feed already downloaded this cycle). Defaults to the record's own
    /// domain.
    fn request_domain(&self, record: &HeadlineRecord) -> Option<String> {
        Some(record.domain.clone())
    }

    async fn fetch_content(&self, record: &HeadlineRecord) -> Result<ArticleContent, ArchiveError>;
}
