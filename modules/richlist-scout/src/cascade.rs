// Fallback cascade: try each strategy in declared order, accept the first
// candidate that passes validation, otherwise reuse the baseline unchanged.

use std::collections::HashSet;

use richlist_common::{EntityRecord, Snapshot};
use tracing::{debug, info, warn};

use crate::error::{FetchError, ParseError, ValidationError};
use crate::extract::{Extractor, RawRow};
use crate::normalize::{normalize_row, NormalizedRow};
use crate::sources::{RetryPolicy, SourceAdapter};

/// One acquisition strategy: a source plus the extractor that understands its layout.
pub struct Strategy {
    source: Box<dyn SourceAdapter>,
    extractor: Extractor,
}

impl Strategy {
    pub fn new(source: Box<dyn SourceAdapter>, extractor: Extractor) -> Self {
        Self { source, extractor }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Live { strategy: String },
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted { rows: usize },
    FetchFailed(FetchError),
    ParseFailed(ParseError),
    Rejected(ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct Acquisition {
    pub snapshot: Snapshot,
    pub origin: Origin,
    pub attempts: Vec<StrategyAttempt>,
}

impl Acquisition {
    pub fn is_degraded(&self) -> bool {
        self.origin == Origin::Degraded
    }
}

enum CascadeState {
    TryAdapter(usize),
    Validate { index: usize, rows: Vec<RawRow> },
    Degrade,
    Done(Snapshot, Origin),
}

pub struct Cascade {
    strategies: Vec<Strategy>,
    retry: RetryPolicy,
    list_size: usize,
    min_valid_rows: usize,
}

impl Cascade {
    pub fn new(
        strategies: Vec<Strategy>,
        retry: RetryPolicy,
        list_size: usize,
        min_valid_rows: usize,
    ) -> Self {
        Self {
            strategies,
            retry,
            list_size,
            min_valid_rows,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(Strategy::name).collect()
    }

    /// Never fails: when every strategy is exhausted the baseline comes back
    /// as the candidate and the origin says `Degraded`.
    pub async fn acquire(&self, baseline: &Snapshot) -> Acquisition {
        let mut attempts = Vec::new();
        let mut state = CascadeState::TryAdapter(0);

        loop {
            state = match state {
                CascadeState::TryAdapter(index) => {
                    let Some(strategy) = self.strategies.get(index) else {
                        state = CascadeState::Degrade;
                        continue;
                    };
                    info!(strategy = strategy.name(), index, "Trying strategy");

                    match self.retry.fetch(strategy.source.as_ref()).await {
                        Err(err) => {
                            warn!(strategy = strategy.name(), error = %err, "Strategy fetch failed");
                            attempts.push(attempt(strategy, AttemptOutcome::FetchFailed(err)));
                            CascadeState::TryAdapter(index + 1)
                        }
                        Ok(doc) => match strategy.extractor.extract(&doc) {
                            Err(err) => {
                                warn!(strategy = strategy.name(), error = %err, "Strategy parse failed");
                                attempts.push(attempt(strategy, AttemptOutcome::ParseFailed(err)));
                                CascadeState::TryAdapter(index + 1)
                            }
                            Ok(rows) => CascadeState::Validate { index, rows },
                        },
                    }
                }
                CascadeState::Validate { index, rows } => {
                    let strategy = &self.strategies[index];
                    let normalized = rows.iter().map(normalize_row).collect();
                    match assemble_candidate(normalized, self.list_size, self.min_valid_rows) {
                        Ok(snapshot) => {
                            let identified = snapshot.identified_count();
                            info!(
                                strategy = strategy.name(),
                                rows = identified,
                                placeholders = snapshot.placeholder_count(),
                                "Candidate accepted"
                            );
                            attempts.push(attempt(strategy, AttemptOutcome::Accepted { rows: identified }));
                            CascadeState::Done(
                                snapshot,
                                Origin::Live {
                                    strategy: strategy.name().to_string(),
                                },
                            )
                        }
                        Err(err) => {
                            warn!(strategy = strategy.name(), error = %err, "Candidate rejected");
                            attempts.push(attempt(strategy, AttemptOutcome::Rejected(err)));
                            CascadeState::TryAdapter(index + 1)
                        }
                    }
                }
                CascadeState::Degrade => {
                    warn!(
                        strategies = self.strategies.len(),
                        baseline_rows = baseline.len(),
                        "All strategies failed, falling back to previous snapshot"
                    );
                    CascadeState::Done(baseline.clone(), Origin::Degraded)
                }
                CascadeState::Done(snapshot, origin) => {
                    return Acquisition {
                        snapshot,
                        origin,
                        attempts,
                    };
                }
            };
        }
    }
}

fn attempt(strategy: &Strategy, outcome: AttemptOutcome) -> StrategyAttempt {
    StrategyAttempt {
        strategy: strategy.name().to_string(),
        outcome,
    }
}

/// Turn normalized rows into a candidate snapshot of exactly `list_size` records:
/// identified rows in source-rank order (first occurrence of a key wins),
/// renumbered `1..k`, then placeholders for `k+1..list_size`.
pub fn assemble_candidate(
    rows: Vec<NormalizedRow>,
    list_size: usize,
    min_valid_rows: usize,
) -> Result<Snapshot, ValidationError> {
    let mut seen = HashSet::new();
    let mut identified = Vec::new();
    let mut unidentified = 0usize;

    for row in rows {
        let Some(key) = row.record.key().map(str::to_string) else {
            unidentified += 1;
            continue;
        };
        if seen.insert(key.clone()) {
            identified.push(row);
        } else {
            warn!(key = key.as_str(), "Duplicate identity key in source, keeping first occurrence");
        }
    }

    if identified.len() < min_valid_rows {
        return Err(ValidationError {
            valid: identified.len(),
            required: min_valid_rows,
        });
    }
    if unidentified > 0 {
        debug!(unidentified, "Rows without a usable identity key dropped");
    }

    // Stable: rows the source did not rank keep their document position, after ranked ones.
    identified.sort_by_key(|row| row.source_rank.as_option().copied().unwrap_or(u64::MAX));
    identified.truncate(list_size);

    let mut records: Vec<EntityRecord> = identified
        .into_iter()
        .enumerate()
        .map(|(i, row)| EntityRecord {
            rank: (i + 1) as u32,
            ..row.record
        })
        .collect();
    for rank in records.len() + 1..=list_size {
        records.push(EntityRecord::placeholder(rank as u32));
    }

    Ok(Snapshot::new(records))
}
