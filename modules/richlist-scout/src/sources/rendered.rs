use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ContentRequest};
use richlist_common::{DocumentFormat, RawDocument};
use tracing::{info, warn};

use super::{classify_response, looks_like_challenge, SourceAdapter};
use crate::error::FetchError;

/// Fetch through the Browserless rendering proxy. Gets past pages that need
/// JavaScript or a real browser fingerprint.
pub struct RenderedSource {
    name: String,
    url: String,
    wait_for_selector: Option<String>,
    timeout: Duration,
    client: BrowserlessClient,
}

impl RenderedSource {
    pub fn new(
        name: &str,
        url: &str,
        base_url: &str,
        token: Option<&str>,
        wait_for_selector: Option<&str>,
        timeout: Duration,
    ) -> browserless_client::Result<Self> {
        let client = BrowserlessClient::with_timeout(base_url, token, timeout)?;
        info!(source = name, base_url, "RenderedSource initialized");
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            wait_for_selector: wait_for_selector.map(String::from),
            timeout,
            client,
        })
    }

    fn request(&self) -> ContentRequest {
        let request = ContentRequest::new(&self.url)
            .wait_until("networkidle2")
            .text_only();
        match self.wait_for_selector.as_deref() {
            Some(selector) => request.wait_for(selector, self.timeout / 2),
            None => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for RenderedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawDocument, FetchError> {
        info!(url = self.url.as_str(), source = "rendered", "Fetching document");

        let html = self
            .client
            .content_with(&self.request())
            .await
            .map_err(to_fetch_error)?;

        if html.trim().is_empty() {
            warn!(url = self.url.as_str(), source = "rendered", "Empty HTML response");
            return Err(FetchError::Transient("empty rendered document".into()));
        }
        if looks_like_challenge(&html) {
            return Err(FetchError::Blocked {
                status: None,
                reason: "anti-bot challenge survived rendering".into(),
            });
        }

        info!(url = self.url.as_str(), source = "rendered", bytes = html.len(), "Fetched successfully");
        Ok(RawDocument {
            url: self.url.clone(),
            body: html,
            format: DocumentFormat::Html,
        })
    }
}

fn to_fetch_error(err: BrowserlessError) -> FetchError {
    match err {
        BrowserlessError::Api { status, message } => classify_response(status, &message)
            .unwrap_or_else(|| FetchError::Transient(format!("browserless status {status}"))),
        BrowserlessError::Timeout(msg) => FetchError::Timeout(msg),
        BrowserlessError::Network(msg) | BrowserlessError::Build(msg) => FetchError::Transient(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browserless_errors_map_onto_fetch_errors() {
        let denied = to_fetch_error(BrowserlessError::Api {
            status: 403,
            message: "forbidden".into(),
        });
        assert!(denied.is_blocked());

        let timeout = to_fetch_error(BrowserlessError::Timeout("30s".into()));
        assert_eq!(timeout, FetchError::Timeout("30s".into()));

        let network = to_fetch_error(BrowserlessError::Network("refused".into()));
        assert_eq!(network, FetchError::Transient("refused".into()));
    }

    #[test]
    fn wait_selector_is_forwarded() {
        let source = RenderedSource::new(
            "rendered",
            "https://example.com/list",
            "http://localhost:3000",
            None,
            Some("table"),
            Duration::from_secs(30),
        )
        .unwrap();
        let req = source.request();
        assert_eq!(req.wait_for_selector.unwrap().selector, "table");
        assert_eq!(req.url, "https://example.com/list");
    }
}
