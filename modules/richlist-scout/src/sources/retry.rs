use std::time::Duration;

use richlist_common::{RawDocument, RetryConfig};
use tracing::warn;

use super::SourceAdapter;
use crate::error::FetchError;

/// Fixed-delay retry around a single adapter. `Blocked` is returned at once:
/// asking the same source again only burns time before the next strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub async fn fetch(&self, source: &dyn SourceAdapter) -> Result<RawDocument, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match source.fetch().await {
                Ok(doc) => return Ok(doc),
                Err(err) if err.is_blocked() => {
                    warn!(source = source.name(), attempt, error = %err, "Source blocked us, not retrying");
                    return Err(err);
                }
                Err(err) if attempt < self.max_attempts => {
                    warn!(
                        source = source.name(),
                        attempt,
                        delay_secs = self.delay.as_secs(),
                        error = %err,
                        "Fetch failed, retrying after delay"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => {
                    warn!(source = source.name(), attempt, error = %err, "Fetch failed, giving up on source");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&RetryConfig::default()).into()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}
