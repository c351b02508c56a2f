// Source adapters: one acquisition strategy each, all behind `SourceAdapter`.
// Adapters fetch once; retrying is `RetryPolicy`'s job.

mod direct;
mod mirror;
mod rendered;
mod retry;

pub use direct::DirectSource;
pub use mirror::MirrorSource;
pub use rendered::RenderedSource;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use richlist_common::{DocumentFormat, RawDocument};

use crate::error::FetchError;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<RawDocument, FetchError>;
}

/// Substrings of anti-bot interstitials. A page containing one is a refusal,
/// whatever its status code.
const CHALLENGE_MARKERS: [&str; 5] = [
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "<title>Just a moment...</title>",
    "Attention Required! | Cloudflare",
];

pub(crate) fn looks_like_challenge(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

/// Map an HTTP response to a fetch failure, or `None` if the body is usable.
pub(crate) fn classify_response(status: u16, body: &str) -> Option<FetchError> {
    match status {
        200..=299 if looks_like_challenge(body) => Some(FetchError::Blocked {
            status: Some(status),
            reason: "anti-bot challenge page".into(),
        }),
        200..=299 if body.trim().is_empty() => {
            Some(FetchError::Transient("empty response body".into()))
        }
        200..=299 => None,
        401 | 403 | 407 | 429 | 451 => Some(FetchError::Blocked {
            status: Some(status),
            reason: format!("access denied (HTTP {status})"),
        }),
        503 if looks_like_challenge(body) => Some(FetchError::Blocked {
            status: Some(status),
            reason: "anti-bot challenge page".into(),
        }),
        _ => Some(FetchError::Transient(format!("HTTP {status}"))),
    }
}

/// Plain GET shared by the direct and mirror adapters.
pub(crate) async fn get_document(
    client: &reqwest::Client,
    url: &str,
    format: DocumentFormat,
) -> Result<RawDocument, FetchError> {
    let accept = match format {
        DocumentFormat::Html => "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
        DocumentFormat::Json => "application/json",
    };

    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await?;
    let status = resp.status().as_u16();
    let body = resp.text().await?;

    if let Some(err) = classify_response(status, &body) {
        return Err(err);
    }

    Ok(RawDocument {
        url: url.to_string(),
        body,
        format,
    })
}
