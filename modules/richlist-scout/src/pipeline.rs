// One scheduled run: load baseline, acquire, reconcile, save.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use richlist_common::{AppConfig, FileConfig, Snapshot, SourceKind};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cascade::{Acquisition, Cascade, Origin, Strategy, StrategyAttempt};
use crate::error::PipelineError;
use crate::extract::Extractor;
use crate::reconcile::{reconcile_detailed, ReconcileStats};
use crate::run_log::{EventKind, RunLog};
use crate::sources::{DirectSource, MirrorSource, RenderedSource, RetryPolicy, SourceAdapter};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A live candidate was reconciled and saved.
    Success,
    /// Every strategy failed; the previous snapshot was left untouched.
    Degraded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Records in the snapshot on disk after the run.
    pub records: usize,
    /// Strategy whose candidate was accepted. `None` when degraded.
    pub strategy: Option<String>,
    pub stats: Option<ReconcileStats>,
    pub attempts: Vec<StrategyAttempt>,
}

pub struct Pipeline {
    cascade: Cascade,
    store: SnapshotStore,
    run_log_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(cascade: Cascade, store: SnapshotStore) -> Self {
        Self {
            cascade,
            store,
            run_log_dir: None,
        }
    }

    /// Write a JSON run log per run into `dir`.
    pub fn with_run_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_log_dir = Some(dir.into());
        self
    }

    pub fn from_config(file: &FileConfig, app: &AppConfig) -> Result<Self> {
        let strategies = build_strategies(file, app)?;
        let cascade = Cascade::new(
            strategies,
            RetryPolicy::from(&file.retry),
            file.list_size,
            file.min_valid_rows,
        );
        let store = SnapshotStore::new(file.snapshot_path(&app.data_dir));
        Ok(Self::new(cascade, store).with_run_log_dir(app.data_dir.join("runs")))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let mut log = RunLog::new(run_id.clone());
        info!(
            run_id = run_id.as_str(),
            strategies = ?self.cascade.strategy_names(),
            snapshot = %self.store.path().display(),
            "Run started"
        );

        let baseline = self.store.load();
        let acquisition = self.cascade.acquire(&baseline).await;
        for attempt in &acquisition.attempts {
            for event in EventKind::from_attempt(attempt) {
                log.log(event);
            }
        }

        let result = self.finish(run_id, acquisition, &baseline, &mut log);

        let status = match &result {
            Ok(report) => report.status.as_str(),
            Err(_) => "failed",
        };
        self.save_run_log(&log, status);

        match &result {
            Ok(report) => info!(
                run_id = report.run_id.as_str(),
                status = %report.status,
                records = report.records,
                strategy = report.strategy.as_deref().unwrap_or("-"),
                "Run finished"
            ),
            Err(e) => error!(error = %e, status = "failed", "Run failed"),
        }
        result
    }

    fn finish(
        &self,
        run_id: String,
        acquisition: Acquisition,
        baseline: &Snapshot,
        log: &mut RunLog,
    ) -> Result<RunReport, PipelineError> {
        let Acquisition {
            snapshot,
            origin,
            attempts,
        } = acquisition;

        let strategy = match origin {
            Origin::Live { strategy } => strategy,
            Origin::Degraded => {
                log.log(EventKind::Degraded {
                    baseline_rows: baseline.len(),
                });
                if baseline.is_empty() {
                    return Err(PipelineError::NoData);
                }
                warn!(
                    status = "degraded",
                    baseline_rows = baseline.len(),
                    "No live data this run, previous snapshot kept as-is"
                );
                return Ok(RunReport {
                    run_id,
                    status: RunStatus::Degraded,
                    records: baseline.len(),
                    strategy: None,
                    stats: None,
                    attempts,
                });
            }
        };

        let outcome = reconcile_detailed(&snapshot, baseline);
        log.log(outcome.stats.into());

        self.store.save(&outcome.snapshot)?;
        log.log(EventKind::SnapshotSaved {
            path: self.store.path().display().to_string(),
            records: outcome.snapshot.len(),
        });

        Ok(RunReport {
            run_id,
            status: RunStatus::Success,
            records: outcome.snapshot.len(),
            strategy: Some(strategy),
            stats: Some(outcome.stats),
            attempts,
        })
    }

    fn save_run_log(&self, log: &RunLog, status: &str) {
        let Some(dir) = &self.run_log_dir else {
            return;
        };
        if let Err(e) = log.save(dir, status) {
            warn!(error = %e, dir = %dir.display(), "Failed to save run log");
        }
    }
}

/// One strategy per configured source, in declared order. Rendered sources
/// are skipped when no Browserless endpoint is configured.
pub fn build_strategies(file: &FileConfig, app: &AppConfig) -> Result<Vec<Strategy>> {
    let timeout = file.request_timeout();
    let mut strategies = Vec::with_capacity(file.sources.len());

    for source in &file.sources {
        let adapter: Box<dyn SourceAdapter> = match source.kind {
            SourceKind::Direct => Box::new(
                DirectSource::new(&source.name, &source.url, timeout)
                    .with_context(|| format!("Failed to build direct source {}", source.name))?,
            ),
            SourceKind::Mirror => Box::new(
                MirrorSource::new(&source.name, &source.url, source.format, timeout)
                    .with_context(|| format!("Failed to build mirror source {}", source.name))?,
            ),
            SourceKind::Rendered => {
                let Some(base_url) = app.browserless_url.as_deref() else {
                    warn!(source = source.name.as_str(), "BROWSERLESS_URL not set, skipping rendered source");
                    continue;
                };
                Box::new(
                    RenderedSource::new(
                        &source.name,
                        &source.url,
                        base_url,
                        app.browserless_token.as_deref(),
                        source.wait_for_selector.as_deref(),
                        timeout,
                    )
                    .with_context(|| format!("Failed to build rendered source {}", source.name))?,
                )
            }
        };
        strategies.push(Strategy::new(
            adapter,
            Extractor::new(source.table_marker.as_deref()),
        ));
    }

    if strategies.is_empty() {
        bail!("No usable sources configured");
    }
    Ok(strategies)
}
