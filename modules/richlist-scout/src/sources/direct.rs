use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use richlist_common::{DocumentFormat, RawDocument};
use tracing::info;

use super::{get_document, SourceAdapter};
use crate::error::FetchError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// GET straight from the origin, dressed as an ordinary browser request.
pub struct DirectSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl DirectSource {
    pub fn new(name: &str, url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        info!(source = name, url, "DirectSource initialized");
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl SourceAdapter for DirectSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawDocument, FetchError> {
        info!(url = self.url.as_str(), source = "direct", "Fetching document");
        let doc = get_document(&self.client, &self.url, DocumentFormat::Html).await?;
        info!(url = self.url.as_str(), source = "direct", bytes = doc.body.len(), "Fetched successfully");
        Ok(doc)
    }
}
