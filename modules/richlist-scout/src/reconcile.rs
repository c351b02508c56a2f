//! Reconciler: merges a freshly acquired candidate with the previous snapshot.
//!
//! Records are matched by identity key. For each matched pair a field takes the
//! candidate's value unless the candidate has it `Missing`, in which case the
//! baseline's value survives. A live observation therefore always beats a stale
//! one, and a gap in today's data never erases yesterday's knowledge.
//!
//! Ranks always come from the candidate. Baseline records whose key is absent
//! from the candidate have left the list and are dropped. Placeholders are
//! never matched and pass through as-is.

use std::collections::{HashMap, HashSet};

use richlist_common::{EntityRecord, Field, Snapshot};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub unchanged: usize,
    pub updated: usize,
    pub inserted: usize,
    pub dropped: usize,
    pub placeholders: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: Snapshot,
    pub stats: ReconcileStats,
}

pub fn reconcile(candidate: &Snapshot, baseline: &Snapshot) -> Snapshot {
    reconcile_detailed(candidate, baseline).snapshot
}

pub fn reconcile_detailed(candidate: &Snapshot, baseline: &Snapshot) -> ReconcileOutcome {
    let mut index: HashMap<&str, &EntityRecord> = HashMap::new();
    for record in baseline.iter() {
        if let Some(key) = record.key() {
            index.entry(key).or_insert(record);
        }
    }

    let mut stats = ReconcileStats::default();
    let mut matched = HashSet::new();
    let mut records = Vec::with_capacity(candidate.len());

    for fresh in candidate.iter() {
        let Some(key) = fresh.key() else {
            stats.placeholders += 1;
            records.push(fresh.clone());
            continue;
        };

        match index.get(key) {
            Some(old) => {
                matched.insert(key);
                let merged = merge_record(fresh, old);
                if merged == **old {
                    stats.unchanged += 1;
                } else {
                    debug!(key, rank = merged.rank, "Record updated");
                    stats.updated += 1;
                }
                records.push(merged);
            }
            None => {
                info!(key, rank = fresh.rank, "New entry in list");
                stats.inserted += 1;
                records.push(fresh.clone());
            }
        }
    }

    for key in index.keys().filter(|k| !matched.contains(*k)) {
        info!(key, "Entry left the list");
        stats.dropped += 1;
    }

    records.sort_by_key(|r| r.rank);

    info!(
        unchanged = stats.unchanged,
        updated = stats.updated,
        inserted = stats.inserted,
        dropped = stats.dropped,
        placeholders = stats.placeholders,
        "Reconciled candidate with previous snapshot"
    );

    ReconcileOutcome {
        snapshot: Snapshot::new(records),
        stats,
    }
}

fn merge_record(fresh: &EntityRecord, old: &EntityRecord) -> EntityRecord {
    EntityRecord {
        identity_key: fresh.identity_key.clone(),
        rank: fresh.rank,
        balance: merge_field(&fresh.balance, &old.balance),
        share_of_total: merge_field(&fresh.share_of_total, &old.share_of_total),
        first_inbound: merge_field(&fresh.first_inbound, &old.first_inbound),
        last_inbound: merge_field(&fresh.last_inbound, &old.last_inbound),
        inbound_count: merge_field(&fresh.inbound_count, &old.inbound_count),
        first_outbound: merge_field(&fresh.first_outbound, &old.first_outbound),
        last_outbound: merge_field(&fresh.last_outbound, &old.last_outbound),
        outbound_count: merge_field(&fresh.outbound_count, &old.outbound_count),
        recent_change: merge_field(&fresh.recent_change, &old.recent_change),
        label: merge_field(&fresh.label, &old.label),
    }
}

fn merge_field<T: Clone>(fresh: &Field<T>, old: &Field<T>) -> Field<T> {
    match fresh {
        Field::Known(_) => fresh.clone(),
        Field::Missing => old.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, rank: u32) -> EntityRecord {
        EntityRecord {
            identity_key: Field::Known(key.to_string()),
            ..EntityRecord::placeholder(rank)
        }
    }

    #[test]
    fn merge_field_prefers_known_candidate() {
        assert_eq!(merge_field(&Field::Known(2), &Field::Known(1)), Field::Known(2));
        assert_eq!(merge_field(&Field::Missing, &Field::Known(1)), Field::Known(1));
        assert_eq!(merge_field::<u8>(&Field::Missing, &Field::Missing), Field::Missing);
    }

    #[test]
    fn empty_string_label_is_an_observation() {
        let mut old = record("a", 1);
        old.label = Field::Known("Exchange".into());
        let mut fresh = record("a", 1);
        fresh.label = Field::Known(String::new());

        let merged = reconcile(&Snapshot::new(vec![fresh]), &Snapshot::new(vec![old]));
        assert_eq!(merged.records()[0].label, Field::Known(String::new()));
    }

    #[test]
    fn stats_count_each_category() {
        let mut a_old = record("a", 1);
        a_old.inbound_count = Field::Known(1);
        let baseline = Snapshot::new(vec![a_old, record("b", 2), record("gone", 3)]);

        let mut a_new = record("a", 1);
        a_new.inbound_count = Field::Known(2);
        let candidate = Snapshot::new(vec![
            a_new,
            record("b", 2),
            record("new", 3),
            EntityRecord::placeholder(4),
        ]);

        let outcome = reconcile_detailed(&candidate, &baseline);
        assert_eq!(
            outcome.stats,
            ReconcileStats {
                unchanged: 1,
                updated: 1,
                inserted: 1,
                dropped: 1,
                placeholders: 1,
            }
        );
        assert!(outcome.snapshot.get("gone").is_none());
    }
}
