//! Strategy A: rendered page extraction.
//!
//! With `render.endpoint` configured, the article URL is sent to a
//! Browserless-compatible `/content` endpoint which returns the page HTML
//! after JavaScript has run. Without one, the article is fetched with a plain
//! GET. Either way the HTML is reduced to its main article and checked for
//! bot walls, paywalls and thin bodies before it is accepted.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::ArchiveError;
use crate::extract::{check_quality, extract_article};
use crate::fetch::HttpFetcher;
use crate::models::{ArticleContent, HeadlineRecord, Strategy};
use crate::traits::ContentStrategy;

#[derive(Debug, Clone)]
enum RenderMode {
    Direct,
    Service { content_url: String },
}

pub struct RenderStrategy {
    fetcher: HttpFetcher,
    mode: RenderMode,
    min_chars: usize,
}

impl RenderStrategy {
    pub fn new(config: &Config, fetcher: HttpFetcher) -> Self {
        let mode = match config.render.endpoint.as_deref() {
            Some(endpoint) => {
                let mut content_url = format!("{}/content", endpoint.trim_end_matches('/'));
                if let Some(token) = config.render.token.as_deref() {
                    content_url.push_str(&format!("?token={token}"));
                }
                RenderMode::Service { content_url }
            }
            None => RenderMode::Direct,
        };
        Self {
            fetcher,
            mode,
            min_chars: config.crawl.min_content_chars,
        }
    }

    /// Human-readable mode for `harc sources`. Never includes the token.
    pub fn describe(config: &Config) -> String {
        match config.render.endpoint.as_deref() {
            Some(endpoint) => format!("render service {}", endpoint.trim_end_matches('/')),
            None => "direct GET".to_string(),
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, ArchiveError> {
        let html = match &self.mode {
            RenderMode::Direct => self.fetcher.get_text(url).await?,
            RenderMode::Service { content_url } => {
                let body = serde_json::json!({ "url": url });
                self.fetcher.post_json_text(content_url, &body).await?
            }
        };
        Ok(html)
    }
}

#[async_trait]
impl ContentStrategy for RenderStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::Render
    }

    async fn fetch_content(&self, record: &HeadlineRecord) -> Result<ArticleContent, ArchiveError> {
        let html = self.fetch_html(&record.url).await?;
        let article = extract_article(&html);
        check_quality(&article.markdown, self.min_chars)?;
        Ok(ArticleContent {
            title: article.title,
            markdown: article.markdown,
            strategy: Strategy::Render,
        })
    }
}
