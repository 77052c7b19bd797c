//! Shared HTTP client for the listing, render and feed fetches.

use std::time::Duration;

use thiserror::Error;

use crate::error::ArchiveError;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: format!("headline-archiver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            request_timeout: config.fetch_timeout(),
            user_agent: config.crawl.user_agent.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("too many redirects: {0}")]
    Redirect(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("response larger than {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
    #[error("network: {0}")]
    Network(String),
}

impl From<FetchError> for ArchiveError {
    fn from(err: FetchError) -> Self {
        ArchiveError::Network(err.to_string())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_redirect() {
        FetchError::Redirect(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Thin wrapper over a configured [`reqwest::Client`]. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read_body(response).await
    }

    /// POST a JSON body to `url` and return the response body as text.
    pub async fn post_json_text(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let response = self
            .client
            .post(parsed)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read_body(response).await
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }
        }
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
