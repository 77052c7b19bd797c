//! Strategy B: syndication feed lookup.
//!
//! `[feeds]` maps a source domain to an RSS or Atom feed. When the
//! rendered page is unusable, the record's domain picks the feed, the feed is
//! downloaded (once per cycle) and the entry whose title matches the headline
//! supplies the article body.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::dedup::normalize_title;
use crate::error::ArchiveError;
use crate::extract::{check_quality, html_to_markdown, QualityIssue};
use crate::fetch::HttpFetcher;
use crate::models::{domain_of, ArticleContent, HeadlineRecord, Strategy};
use crate::traits::ContentStrategy;

/// Containment matches need at least this many normalized characters on the
/// shorter side, so "Stocks" does not match every market wrap.
const MIN_CONTAINED_TITLE_CHARS: usize = 20;

/// One usable entry of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    /// Full content when the feed carries it, otherwise the description.
    pub html: String,
}

/// HTML named entities seen in real feeds, as code points. XML itself only
/// defines the five predefined ones.
const HTML_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("iexcl", 161),
    ("cent", 162),
    ("pound", 163),
    ("yen", 165),
    ("sect", 167),
    ("copy", 169),
    ("laquo", 171),
    ("reg", 174),
    ("deg", 176),
    ("plusmn", 177),
    ("middot", 183),
    ("raquo", 187),
    ("frac12", 189),
    ("iquest", 191),
    ("Agrave", 192),
    ("Aacute", 193),
    ("Acirc", 194),
    ("Auml", 196),
    ("Ccedil", 199),
    ("Egrave", 200),
    ("Eacute", 201),
    ("Ntilde", 209),
    ("Ouml", 214),
    ("times", 215),
    ("Uuml", 220),
    ("szlig", 223),
    ("agrave", 224),
    ("aacute", 225),
    ("acirc", 226),
    ("atilde", 227),
    ("auml", 228),
    ("aring", 229),
    ("ccedil", 231),
    ("egrave", 232),
    ("eacute", 233),
    ("ecirc", 234),
    ("euml", 235),
    ("igrave", 236),
    ("iacute", 237),
    ("icirc", 238),
    ("iuml", 239),
    ("ntilde", 241),
    ("ograve", 242),
    ("oacute", 243),
    ("ocirc", 244),
    ("otilde", 245),
    ("ouml", 246),
    ("divide", 247),
    ("oslash", 248),
    ("ugrave", 249),
    ("uacute", 250),
    ("ucirc", 251),
    ("uuml", 252),
    ("yacute", 253),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("sbquo", 8218),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("bdquo", 8222),
    ("bull", 8226),
    ("hellip", 8230),
    ("prime", 8242),
    ("euro", 8364),
    ("trade", 8482),
];

const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

/// Rewrite HTML named entities so the document is well-formed XML. Known
/// ones become numeric references; unknown ones are escaped so they survive
/// as literal text instead of failing the whole feed.
fn rewrite_html_entities(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let name_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .filter(|&end| end > 0 && rest[end..].starts_with(';'));
        let Some(len) = name_len else {
            out.push('&');
            continue;
        };
        let name = &rest[..len];
        if XML_ENTITIES.contains(&name) || !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            out.push('&');
            continue;
        }
        match HTML_ENTITIES.iter().find(|(known, _)| *known == name) {
            Some((_, code)) => out.push_str(&format!("&#{};", code)),
            None => out.push_str(&format!("&amp;{};", name)),
        }
        rest = &rest[len + 1..];
    }
    out.push_str(rest);
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse an RSS 0.9x/1.0/2.0 or Atom document. Entries without a title are
/// dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, String> {
    let xml = rewrite_html_entities(xml);
    let feed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| format!("not an RSS or Atom feed: {}", e))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = non_empty(entry.title.map(|t| t.content))?;
            let html = non_empty(entry.content.and_then(|c| c.body))
                .or_else(|| non_empty(entry.summary.map(|s| s.content)))
                .unwrap_or_default();
            Some(FeedEntry {
                title: title.trim().to_string(),
                link: entry.links.first().map(|l| l.href.trim().to_string()),
                html,
            })
        })
        .collect())
}

/// Entry for `title`: same link, else equal normalized titles, else one
/// normalized title containing the other.
pub fn find_entry<'a>(entries: &'a [FeedEntry], title: &str, url: &str) -> Option<&'a FeedEntry> {
    if let Some(entry) = entries.iter().find(|e| e.link.as_deref() == Some(url)) {
        return Some(entry);
    }

    let wanted = normalize_title(title);
    if wanted.is_empty() {
        return None;
    }
    if let Some(entry) = entries.iter().find(|e| normalize_title(&e.title) == wanted) {
        return Some(entry);
    }
    entries.iter().find(|e| {
        let candidate = normalize_title(&e.title);
        let (short, long) = if candidate.len() < wanted.len() {
            (&candidate, &wanted)
        } else {
            (&wanted, &candidate)
        };
        short.chars().count() >= MIN_CONTAINED_TITLE_CHARS && long.contains(short.as_str())
    })
}

pub struct FeedStrategy {
    fetcher: HttpFetcher,
    feeds: BTreeMap<String, String>,
    min_chars: usize,
    cache: Mutex<HashMap<String, Arc<Vec<FeedEntry>>>>,
}

impl FeedStrategy {
    pub fn new(config: &Config, fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            feeds: config
                .feeds
                .iter()
                .map(|(domain, url)| (domain.to_ascii_lowercase(), url.clone()))
                .collect(),
            min_chars: config.crawl.min_feed_chars,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Feed configured for `domain` or its closest configured parent domain.
    pub fn feed_url_for(&self, domain: &str) -> Option<&str> {
        let domain = domain.to_ascii_lowercase();
        self.feeds
            .iter()
            .filter(|(key, _)| domain == **key || domain.ends_with(&format!(".{}", key)))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, url)| url.as_str())
    }

    async fn entries(&self, feed_url: &str) -> Result<Arc<Vec<FeedEntry>>, ArchiveError> {
        let cached = self.cache.lock().unwrap().get(feed_url).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let xml = self.fetcher.get_text(feed_url).await?;
        let entries = parse_feed(&xml)
            .map_err(|e| ArchiveError::Network(format!("feed {}: {}", feed_url, e)))?;
        tracing::debug!(feed = feed_url, entries = entries.len(), "fetched feed");

        let entries = Arc::new(entries);
        self.cache
            .lock()
            .unwrap()
            .insert(feed_url.to_string(), entries.clone());
        Ok(entries)
    }
}

#[async_trait]
impl ContentStrategy for FeedStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::Feed
    }

    fn reset(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// The feed's host, unless the feed was already downloaded this cycle.
    fn request_domain(&self, record: &HeadlineRecord) -> Option<String> {
        let feed_url = self.feed_url_for(&record.domain)?;
        if self.cache.lock().unwrap().contains_key(feed_url) {
            return None;
        }
        domain_of(feed_url)
    }

    async fn fetch_content(&self, record: &HeadlineRecord) -> Result<ArticleContent, ArchiveError> {
        let feed_url = self
            .feed_url_for(&record.domain)
            .ok_or_else(|| QualityIssue::NoFeed(record.domain.clone()))?;
        let entries = self.entries(feed_url).await?;
        let entry = find_entry(&entries, &record.title, &record.url).ok_or(QualityIssue::NotInFeed)?;

        let markdown = html_to_markdown(&entry.html);
        check_quality(&markdown, self.min_chars)?;
        Ok(ArticleContent {
            title: Some(entry.title.clone()),
            markdown,
            strategy: Strategy::Feed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Markets</title>
    <link>https://example.com</link>
    <item>
      <title>Fed holds rates steady as inflation cools</title>
      <link>https://example.com/fed</link>
      <description><![CDATA[<p>Short teaser&nbsp;text.</p>]]></description>
      <content:encoded><![CDATA[<p>The Federal Reserve held rates.</p>]]></content:encoded>
    </item>
    <item>
      <title>Oil prices slip</title>
      <link>https://example.com/oil</link>
      <description>Crude &amp; gas fell.</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Wire</title>
  <entry>
    <title type="text">Apple unveils new chips for data centers</title>
    <summary type="html">&lt;p&gt;Apple said on Monday...&lt;/p&gt;</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parses_rss_preferring_full_content() {
        let entries = parse_feed(RSS).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].html.contains("The Federal Reserve held rates."));
        assert_eq!(entries[1].html, "Crude & gas fell.");
        assert_eq!(entries[1].link.as_deref(), Some("https://example.com/oil"));
    }

    #[test]
    fn test_parses_atom_summary() {
        let entries = parse_feed(ATOM).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Apple unveils new chips for data centers");
        assert!(entries[0].html.contains("Apple said on Monday"));
    }

    #[test]
    fn test_html_entities_do_not_break_the_feed() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Wire</title>
    <item>
      <title>Nestl&eacute; shares rise &ndash; analysts upbeat</title>
      <link>https://example.com/nestle</link>
      <description>Caf&eacute; sales &amp; a &madeup; marker.</description>
    </item>
  </channel>
</rss>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Nestl\u{e9} shares rise \u{2013} analysts upbeat");
        assert!(entries[0].html.contains("Caf\u{e9} sales & a &madeup; marker."));
    }

    #[test]
    fn test_parses_rss_1_rdf() {
        let xml = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel rdf:about="https://example.com/">
    <title>Markets</title>
    <link>https://example.com/</link>
    <description>Market news</description>
  </channel>
  <item rdf:about="https://example.com/copper">
    <title>Copper hits two-year high on China demand</title>
    <link>https://example.com/copper</link>
    <description>Copper rallied for a fifth session.</description>
  </item>
</rdf:RDF>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/copper"));
        assert!(entries[0].html.contains("fifth session"));
    }

    #[test]
    fn test_rewrite_leaves_xml_and_numeric_entities() {
        assert_eq!(
            rewrite_html_entities("a &amp; b &#233; &hellip; &bogus; & c"),
            "a &amp; b &#233; &#8230; &amp;bogus; & c"
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_feed("<html><body>nope").is_err());
    }

    #[test]
    fn test_title_matching() {
        let entries = parse_feed(RSS).unwrap();
        let by_title = find_entry(&entries, "FED holds rates steady, as inflation cools!", "https://x.com/a");
        assert_eq!(by_title.map(|e| e.title.as_str()), Some("Fed holds rates steady as inflation cools"));

        let contained = find_entry(
            &entries,
            "UPDATE 2-Fed holds rates steady as inflation cools - sources",
            "https://x.com/b",
        );
        assert!(contained.is_some());

        let by_link = find_entry(&entries, "Totally different", "https://example.com/oil");
        assert_eq!(by_link.map(|e| e.title.as_str()), Some("Oil prices slip"));

        // Too short for a containment match.
        assert!(find_entry(&entries, "Oil", "https://x.com/c").is_none());
    }
}
