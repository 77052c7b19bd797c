//! Headline listing connector.
//!
//! Fetches the news listing page and turns each table row into a
//! [`Headline`]. The page layout is configurable through CSS selectors
//! (`[listing]` in the config) so a markup change upstream is a config edit,
//! not a release. Rows without a link or title, or with a timestamp in an
//! unknown format, are skipped and counted.
//!
//! # Timestamps
//!
//! The listing prints wall-clock times in `crawl.timezone`:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `09:35AM` | time on the date last printed above this row (today if none) |
//! | `Today 09:35AM` | time today |
//! | `Oct-18-24 09:35AM` | full date and time |
//! | `Oct-18` | midnight; current year unless that lies in the future |
//! | *(empty)* | observation time |

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::{Config, ListingConfig};
use crate::error::ArchiveError;
use crate::fetch::HttpFetcher;
use crate::models::{domain_of, Headline};
use crate::traits::ListingSource;

/// Compiled selectors for one listing layout.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    row: Selector,
    link: Selector,
    time: Selector,
    source: Selector,
}

fn compile(selector: &str) -> Result<Selector, ArchiveError> {
    Selector::parse(selector)
        .map_err(|_| ArchiveError::Config(format!("invalid CSS selector: '{}'", selector)))
}

impl ListingSelectors {
    pub fn from_config(listing: &ListingConfig) -> Result<Self, ArchiveError> {
        Ok(Self {
            row: compile(&listing.row_selector)?,
            link: compile(&listing.link_selector)?,
            time: compile(&listing.time_selector)?,
            source: compile(&listing.source_selector)?,
        })
    }
}

/// Result of parsing one listing page.
#[derive(Debug, Clone, Default)]
pub struct ParsedListing {
    pub headlines: Vec<Headline>,
    /// Rows matched by the row selector but dropped as unparseable.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingTime {
    Full(NaiveDateTime),
    TimeOnly(NaiveTime),
    DateOnly(NaiveDate),
    Missing,
}

fn parse_listing_time(raw: &str, today: NaiveDate) -> Option<ListingTime> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return Some(ListingTime::Missing);
    }

    if let Some(rest) = text.strip_prefix("Today") {
        let time = NaiveTime::parse_from_str(rest.trim(), "%I:%M%p").ok()?;
        return Some(ListingTime::Full(today.and_time(time)));
    }
    if let Ok(full) = NaiveDateTime::parse_from_str(&text, "%b-%d-%y %I:%M%p") {
        return Some(ListingTime::Full(full));
    }
    if let Ok(time) = NaiveTime::parse_from_str(&text, "%I:%M%p") {
        return Some(ListingTime::TimeOnly(time));
    }
    let with_year = format!("{}-{}", text, today.year());
    if let Ok(date) = NaiveDate::parse_from_str(&with_year, "%b-%d-%Y") {
        if date > today {
            return date.with_year(today.year() - 1).map(ListingTime::DateOnly);
        }
        return Some(ListingTime::DateOnly(date));
    }
    None
}

/// Resolve a wall-clock time in `tz` to UTC. Times inside a DST gap are
/// shifted forward by one hour.
fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a listing page. `now` anchors relative timestamps.
pub fn parse_listing(
    html: &str,
    selectors: &ListingSelectors,
    base_url: &Url,
    tz: Tz,
    now: DateTime<Utc>,
) -> ParsedListing {
    let doc = Html::parse_document(html);
    let today = now.with_timezone(&tz).date_naive();
    let mut current_date = today;
    let mut parsed = ParsedListing::default();

    for row in doc.select(&selectors.row) {
        let Some(link) = row.select(&selectors.link).next() else {
            parsed.skipped += 1;
            continue;
        };
        let title = element_text(link);
        let url = link
            .value()
            .attr("href")
            .and_then(|href| base_url.join(href.trim()).ok());
        let (Some(url), false) = (url, title.is_empty()) else {
            parsed.skipped += 1;
            continue;
        };

        let raw_time = row
            .select(&selectors.time)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let publish_at = match parse_listing_time(&raw_time, today) {
            Some(ListingTime::Full(naive)) => {
                current_date = naive.date();
                localize(tz, naive)
            }
            Some(ListingTime::TimeOnly(time)) => localize(tz, current_date.and_time(time)),
            Some(ListingTime::DateOnly(date)) => {
                current_date = date;
                date.and_hms_opt(0, 0, 0).and_then(|naive| localize(tz, naive))
            }
            Some(ListingTime::Missing) => Some(now),
            None => None,
        };
        let Some(publish_at) = publish_at else {
            tracing::debug!(raw_time = %raw_time, title = %title, "unparseable listing timestamp");
            parsed.skipped += 1;
            continue;
        };

        let source = row
            .select(&selectors.source)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty());

        parsed.headlines.push(Headline {
            title,
            url: url.to_string(),
            source,
            publish_at,
        });
    }

    parsed
}

/// The Finviz news listing (or any page with the same row layout).
pub struct FinvizListing {
    fetcher: HttpFetcher,
    url: Url,
    selectors: ListingSelectors,
    tz: Tz,
}

impl FinvizListing {
    pub fn new(config: &Config, fetcher: HttpFetcher) -> Result<Self, ArchiveError> {
        let url = Url::parse(&config.listing.url).map_err(|e| {
            ArchiveError::Config(format!("invalid listing url '{}': {}", config.listing.url, e))
        })?;
        Ok(Self {
            fetcher,
            url,
            selectors: ListingSelectors::from_config(&config.listing)?,
            tz: config.timezone()?,
        })
    }
}

#[async_trait]
impl ListingSource for FinvizListing {
    fn name(&self) -> &str {
        "finviz"
    }

    fn request_domain(&self) -> Option<String> {
        domain_of(self.url.as_str())
    }

    async fn fetch_listing(&self) -> Result<Vec<Headline>, ArchiveError> {
        let html = self.fetcher.get_text(self.url.as_str()).await?;
        let parsed = parse_listing(&html, &self.selectors, &self.url, self.tz, Utc::now());
        tracing::debug!(
            listing = self.name(),
            headlines = parsed.headlines.len(),
            skipped = parsed.skipped,
            "parsed listing"
        );
        Ok(parsed.headlines)
    }
}
