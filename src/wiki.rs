//! Encyclopedia page source.
//!
//! [`PageSource`] is the capability the retriever needs: resolve a topic
//! to `{id, title, text}` or fail. [`WikipediaClient`] implements it over
//! the MediaWiki Action API, requesting the plain-text extract of the
//! page (redirects followed) with the configured user agent.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, WikipediaConfig};
use crate::models::Page;

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page for `topic`. Missing pages and pages with no text are errors.
    async fn fetch_page(&self, topic: &str) -> Result<Page>;
}

pub struct WikipediaClient {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaClient {
    pub fn new(config: &WikipediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: format!("{}/w/api.php", config.api_base()),
        })
    }
}

#[async_trait]
impl PageSource for WikipediaClient {
    async fn fetch_page(&self, topic: &str) -> Result<Page> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts|info"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", topic),
            ])
            .send()
            .await
            .with_context(|| format!("Wikipedia request failed for '{}'", topic))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Wikipedia API error {} for '{}'", status, topic);
        }

        let json: serde_json::Value = response.json().await?;
        parse_extract_response(topic, &json)
    }
}

/// Parse a `formatversion=2` extracts response into a [`Page`].
pub fn parse_extract_response(topic: &str, json: &serde_json::Value) -> Result<Page> {
    if let Some(info) = json.get("error").and_then(|e| e.get("info")) {
        bail!("Wikipedia error for '{}': {}", topic, info);
    }

    let page = json
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(|p| p.as_array())
        .and_then(|pages| pages.first())
        .ok_or_else(|| anyhow!("Invalid Wikipedia response for '{}': no pages", topic))?;

    if page.get("missing").is_some() || page.get("invalid").is_some() {
        bail!("Page not found: '{}'", topic);
    }

    let text = page
        .get("extract")
        .and_then(|e| e.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    if text.is_empty() {
        bail!("Page not found: '{}' has no text", topic);
    }

    let id = page
        .get("pageid")
        .and_then(|id| id.as_i64())
        .map(|id| id.to_string())
        .unwrap_or_default();
    let title = page
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or(topic)
        .to_string();

    Ok(Page { id, title, text })
}

/// Create the encyclopedia source from configuration.
pub fn create_page_source(config: &Config) -> Result<Arc<dyn PageSource>> {
    Ok(Arc::new(WikipediaClient::new(&config.wikipedia)?))
}
