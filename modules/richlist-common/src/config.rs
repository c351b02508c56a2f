use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::DocumentFormat;

pub const DEFAULT_SOURCE_URL: &str =
    "https://bitinfocharts.com/top-100-richest-bitcoin-addresses.html";
pub const DEFAULT_TABLE_MARKER: &str = "tblTop100Wealth";

/// Environment-specific values. Secrets stay here; everything tunable lives
/// in the TOML [`FileConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config = Self {
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            browserless_url: non_empty_env("BROWSERLESS_URL"),
            browserless_token: non_empty_env("BROWSERLESS_TOKEN"),
        };

        config.log_keys();
        config
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  DATA_DIR: {}", self.data_dir.display());
        tracing::info!("  BROWSERLESS_URL: {}", self.browserless_url.as_deref().unwrap_or("<not set>"));
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
    }
}

/// First five characters of a secret plus its length.
fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) => {
            let head: String = v.chars().take(5).collect();
            format!("{head}...({} chars)", v.chars().count())
        }
        None => "<not set>".to_string(),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// --- File config ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Plain HTTP GET against the origin.
    Direct,
    /// Through the Browserless rendering proxy.
    Rendered,
    /// Alternate host publishing the same list, HTML or JSON.
    Mirror,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    #[serde(default)]
    pub format: DocumentFormat,
    /// `id` of the ranked-list table. When absent only the header heuristic is used.
    #[serde(default)]
    pub table_marker: Option<String>,
    /// Rendered sources only: selector to wait for before the DOM is captured.
    #[serde(default)]
    pub wait_for_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 3,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// TOML-backed pipeline configuration. Every key has a default, so an absent
/// file is equivalent to an empty one.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    /// Relative paths resolve against `DATA_DIR`.
    pub snapshot_file: PathBuf,
    pub list_size: usize,
    pub min_valid_rows: usize,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            snapshot_file: PathBuf::from("wallet.json"),
            list_size: 100,
            min_valid_rows: 1,
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
            sources: vec![
                SourceConfig {
                    name: "bitinfocharts".to_string(),
                    kind: SourceKind::Direct,
                    url: DEFAULT_SOURCE_URL.to_string(),
                    format: DocumentFormat::Html,
                    table_marker: Some(DEFAULT_TABLE_MARKER.to_string()),
                    wait_for_selector: None,
                },
                SourceConfig {
                    name: "bitinfocharts-rendered".to_string(),
                    kind: SourceKind::Rendered,
                    url: DEFAULT_SOURCE_URL.to_string(),
                    format: DocumentFormat::Html,
                    table_marker: Some(DEFAULT_TABLE_MARKER.to_string()),
                    wait_for_selector: Some("table".to_string()),
                },
            ],
        }
    }
}

impl FileConfig {
    pub fn snapshot_path(&self, data_dir: &Path) -> PathBuf {
        if self.snapshot_file.is_absolute() {
            self.snapshot_file.clone()
        } else {
            data_dir.join(&self.snapshot_file)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_size == 0 {
            return Err(ConfigError::Invalid("list_size must be at least 1".into()));
        }
        if self.min_valid_rows == 0 || self.min_valid_rows > self.list_size {
            return Err(ConfigError::Invalid(format!(
                "min_valid_rows must be within 1..={}",
                self.list_size
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source is required".into()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source name: {}", source.name)));
            }
            let parsed = url::Url::parse(&source.url).map_err(|e| {
                ConfigError::Invalid(format!("source {}: invalid url: {e}", source.name))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::Invalid(format!(
                    "source {}: only http/https URLs allowed, got: {}",
                    source.name,
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<FileConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "No config file, using built-in defaults");
        let config = FileConfig::default();
        config.validate()?;
        Ok(config)
    }
}
