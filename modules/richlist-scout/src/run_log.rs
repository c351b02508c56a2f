//! Run log: persisted JSON timeline of every action taken during one run.
//!
//! Each run produces a single `{data_dir}/runs/{run_id}.json` file containing
//! an ordered list of events with timestamps. It records what the pipeline did,
//! not the data it produced.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cascade::{AttemptOutcome, StrategyAttempt};
use crate::reconcile::ReconcileStats;

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StrategyAttempt {
        strategy: String,
        success: bool,
        rows: usize,
    },
    StrategyRejected {
        strategy: String,
        stage: String,
        reason: String,
    },
    Degraded {
        baseline_rows: usize,
    },
    Reconciled {
        unchanged: usize,
        updated: usize,
        inserted: usize,
        dropped: usize,
        placeholders: usize,
    },
    SnapshotSaved {
        path: String,
        records: usize,
    },
}

impl From<ReconcileStats> for EventKind {
    fn from(s: ReconcileStats) -> Self {
        EventKind::Reconciled {
            unchanged: s.unchanged,
            updated: s.updated,
            inserted: s.inserted,
            dropped: s.dropped,
            placeholders: s.placeholders,
        }
    }
}

impl EventKind {
    /// Run-log events for one cascade attempt.
    pub fn from_attempt(attempt: &StrategyAttempt) -> Vec<EventKind> {
        let strategy = attempt.strategy.clone();
        let (stage, reason) = match &attempt.outcome {
            AttemptOutcome::Accepted { rows } => {
                return vec![EventKind::StrategyAttempt {
                    strategy,
                    success: true,
                    rows: *rows,
                }];
            }
            AttemptOutcome::FetchFailed(e) => ("fetch", e.to_string()),
            AttemptOutcome::ParseFailed(e) => ("parse", e.to_string()),
            AttemptOutcome::Rejected(e) => ("validate", e.to_string()),
        };
        vec![
            EventKind::StrategyAttempt {
                strategy: strategy.clone(),
                success: false,
                rows: 0,
            },
            EventKind::StrategyRejected {
                strategy,
                stage: stage.to_string(),
                reason,
            },
        ]
    }
}

impl RunLog {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write it under `dir`.
    /// Returns the file path on success.
    pub fn save(&self, dir: &Path, status: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    status: &'a str,
    events: &'a [RunEvent],
}
