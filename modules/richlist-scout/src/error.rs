use std::path::PathBuf;

use richlist_common::DocumentFormat;
use thiserror::Error;

/// A source could not deliver a document. Recovered by moving to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The source actively refused us. Never retried against the same source.
    #[error("Blocked (status {status:?}): {reason}")]
    Blocked { status: Option<u16>, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl FetchError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Ranked-list structure not found in {format} document")]
    StructureNotFound { format: DocumentFormat },
}

/// Parsed fine, but too few identified rows to trust.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Only {valid} identified rows, need at least {required}")]
pub struct ValidationError {
    pub valid: usize,
    pub required: usize,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Refusing to save an empty snapshot")]
    EmptySnapshot,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Hard failures of a run. Everything else degrades.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("All sources failed and no previous snapshot is available")]
    NoData,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
