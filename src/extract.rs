//! HTML article extraction and content-quality checks.
//!
//! Extraction is readability-like rather than exhaustive: boilerplate
//! elements are detached from the tree, the first `<article>`, `<main>` or
//! `<body>` container is chosen, and its inner HTML is converted to Markdown.
//! [`check_quality`] then decides whether the result is a real article or a
//! bot wall, paywall stub or empty shell.

use std::fmt;

use scraper::{Html, Selector};

/// Elements removed before the container is chosen.
const BOILERPLATE: &str = "script, style, noscript, nav, header, footer, aside, form, iframe, svg";

/// Containers tried in order; the first match wins.
const CONTAINERS: [&str; 3] = ["article", "main", "body"];

/// Phrases that mark a subscription wall instead of an article body.
const PAYWALL_MARKERS: &[&str] = &[
    "subscribe to continue reading",
    "subscribe to read",
    "this article is for subscribers",
    "already a subscriber",
    "create a free account to continue",
    "to continue reading, subscribe",
    "become a member to read",
];

/// Phrases that mark an anti-bot interstitial.
const BOT_MARKERS: &[&str] = &[
    "are you a robot",
    "verify you are human",
    "checking your browser",
    "enable javascript and cookies to continue",
    "access denied",
    "captcha",
    "unusual activity from your computer network",
];

/// Marker phrases only count in documents shorter than this; a full article
/// may legitimately mention "captcha" or carry a subscribe footer.
const MARKER_WINDOW_CHARS: usize = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub markdown: String,
}

/// Why extracted text was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityIssue {
    Empty,
    TooShort { chars: usize, min: usize },
    Paywall(String),
    BotBlocked(String),
    /// No syndication feed is configured for the domain.
    NoFeed(String),
    /// The feed had no entry for the headline.
    NotInFeed,
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::Empty => write!(f, "no article text"),
            QualityIssue::TooShort { chars, min } => {
                write!(f, "article text too short ({} < {} chars)", chars, min)
            }
            QualityIssue::Paywall(marker) => write!(f, "paywall detected ('{}')", marker),
            QualityIssue::BotBlocked(marker) => write!(f, "bot wall detected ('{}')", marker),
            QualityIssue::NoFeed(domain) => write!(f, "no feed configured for {}", domain),
            QualityIssue::NotInFeed => write!(f, "headline not found in source feed"),
        }
    }
}

/// Extract the main article of an HTML page as Markdown.
pub fn extract_article(html: &str) -> ExtractedArticle {
    let mut doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|t| t.text().collect::<String>())
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    if let Ok(sel) = Selector::parse(BOILERPLATE) {
        let ids: Vec<_> = doc.select(&sel).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    let content_html = CONTAINERS
        .iter()
        .filter_map(|c| Selector::parse(c).ok())
        .find_map(|sel| doc.select(&sel).next().map(|node| node.inner_html()))
        .unwrap_or_else(|| doc.root_element().html());

    ExtractedArticle {
        title,
        markdown: html_to_markdown(&content_html),
    }
}

/// Convert an HTML fragment to Markdown, trimming surrounding blank lines.
pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html).trim().to_string()
}

/// Accept `text` as article content, or say why not.
pub fn check_quality(text: &str, min_chars: usize) -> Result<(), QualityIssue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(QualityIssue::Empty);
    }

    let chars = trimmed.chars().count();
    if chars < MARKER_WINDOW_CHARS {
        let lower = trimmed.to_lowercase();
        if let Some(marker) = BOT_MARKERS.iter().find(|m| lower.contains(*m)) {
            return Err(QualityIssue::BotBlocked(marker.to_string()));
        }
        if let Some(marker) = PAYWALL_MARKERS.iter().find(|m| lower.contains(*m)) {
            return Err(QualityIssue::Paywall(marker.to_string()));
        }
    }

    if chars < min_chars {
        return Err(QualityIssue::TooShort {
            chars,
            min: min_chars,
        });
    }
    Ok(())
}
