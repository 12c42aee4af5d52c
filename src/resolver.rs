//! Page-title lookup used when the auto-populating realm sees a new key.

use crate::config::ResolverConfig;
use crate::core::{Result, TallyError};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

lazy_static::lazy_static! {
    static ref TITLE_RE: Regex = Regex::new("<title>(.*)</title>").expect("title pattern compiles");
}

/// Resolves a fully-qualified URL to a display title.
#[async_trait]
pub trait TitleResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// Pulls the first `<title>` out of `page`, HTML-unescaped, or falls back to `url`.
pub fn extract_title(page: &str, url: &str) -> String {
    let raw = TITLE_RE
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(url);
    html_escape::decode_html_entities(raw).into_owned()
}

/// Resolver backed by an HTTP GET with bounded time and body size.
#[derive(Debug, Clone)]
pub struct HttpTitleResolver {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpTitleResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TallyError::FetchFailed(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>> {
        let mut page = Vec::with_capacity(self.max_body_bytes.min(8 * 1024));
        while page.len() < self.max_body_bytes {
            let chunk = response
                .chunk()
                .await
                .map_err(|err| TallyError::FetchFailed(err.to_string()))?;
            let Some(chunk) = chunk else { break };
            let room = self.max_body_bytes - page.len();
            page.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
        Ok(page)
    }
}

#[async_trait]
impl TitleResolver for HttpTitleResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        debug!(url, "validating url");
        let response = self.client.get(url).send().await.map_err(|err| {
            warn!(url, error = %err, "title fetch failed");
            TallyError::FetchFailed(err.to_string())
        })?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "title fetch returned");
        if !status.is_success() {
            return Err(TallyError::FetchFailed(format!("{} returned {}", url, status)));
        }

        let page = self.read_capped(response).await?;
        Ok(extract_title(&String::from_utf8_lossy(&page), url))
    }
}
