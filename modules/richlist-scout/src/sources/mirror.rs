use std::time::Duration;

use async_trait::async_trait;
use richlist_common::{DocumentFormat, RawDocument};
use tracing::info;

use super::{get_document, SourceAdapter};
use crate::error::FetchError;

/// Alternate host exposing the same list, possibly as JSON or with a different layout.
pub struct MirrorSource {
    name: String,
    url: String,
    format: DocumentFormat,
    client: reqwest::Client,
}

impl MirrorSource {
    pub fn new(name: &str, url: &str, format: DocumentFormat, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("richlist-scout/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        info!(source = name, url, format = %format, "MirrorSource initialized");
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            format,
            client,
        })
    }
}

#[async_trait]
impl SourceAdapter for MirrorSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawDocument, FetchError> {
        info!(url = self.url.as_str(), source = "mirror", format = %self.format, "Fetching document");
        let doc = get_document(&self.client, &self.url, self.format).await?;
        info!(url = self.url.as_str(), source = "mirror", bytes = doc.body.len(), "Fetched successfully");
        Ok(doc)
    }
}
