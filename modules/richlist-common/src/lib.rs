pub mod config;
pub mod error;
pub mod types;

pub use config::{
    load_config, load_config_or_default, AppConfig, FileConfig, RetryConfig, SourceConfig,
    SourceKind, DEFAULT_SOURCE_URL, DEFAULT_TABLE_MARKER,
};
pub use error::ConfigError;
pub use types::*;
