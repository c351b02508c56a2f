use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use richlist_common::{load_config_or_default, AppConfig};
use richlist_scout::pipeline::{Pipeline, RunStatus};

/// Refresh the stored top-N list from the first source that answers.
#[derive(Parser, Debug)]
#[command(name = "richlist-scout", version)]
struct Cli {
    /// Pipeline config (TOML). Built-in defaults apply when the file does not exist.
    #[arg(long, env = "RICHLIST_CONFIG", default_value = "config/richlist.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("richlist_scout=info".parse()?)
                .add_directive("richlist_common=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "Richlist scout starting...");

    let app = AppConfig::from_env();
    let file = load_config_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let pipeline = Pipeline::from_config(&file, &app)?;
    let report = pipeline.run_once().await?;

    if report.status == RunStatus::Degraded {
        info!(
            status = "degraded",
            records = report.records,
            "Done: previous snapshot kept"
        );
    } else {
        info!(
            status = "success",
            records = report.records,
            strategy = report.strategy.as_deref().unwrap_or("-"),
            "Done"
        );
    }
    Ok(())
}
