//! End-to-end runs: scripted sources in, snapshot file and run log out.

use std::path::Path;

use richlist_common::{Field, Snapshot};
use richlist_scout::cascade::Cascade;
use richlist_scout::error::PipelineError;
use richlist_scout::pipeline::{Pipeline, RunStatus};
use richlist_scout::store::SnapshotStore;
use richlist_scout::testing::*;

fn pipeline(dir: &Path, sources: Vec<MockSource>) -> Pipeline {
    let cascade = Cascade::new(
        sources.into_iter().map(mock_strategy).collect(),
        instant_retry(2),
        100,
        1,
    );
    Pipeline::new(cascade, SnapshotStore::new(dir.join("wallet.json")))
        .with_run_log_dir(dir.join("runs"))
}

fn run_logs(dir: &Path) -> Vec<serde_json::Value> {
    let Ok(entries) = std::fs::read_dir(dir.join("runs")) else {
        return Vec::new();
    };
    entries
        .map(|e| {
            let path = e.unwrap().path();
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn first_run_writes_full_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![MockSource::serving("primary", standard_page(100))]);

    let report = pipeline.run_once().await.unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.strategy.as_deref(), Some("primary"));
    assert_eq!(report.records, 100);

    let saved = pipeline.store().load();
    assert_eq!(saved.len(), 100);
    assert_eq!(saved.placeholder_count(), 0);
    assert!(saved.validate().is_ok());

    let logs = run_logs(dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[0]["run_id"], report.run_id.as_str());
}

#[tokio::test]
async fn second_run_keeps_knowledge_the_source_dropped() {
    let dir = tempfile::tempdir().unwrap();

    let first = pipeline(
        dir.path(),
        vec![MockSource::serving("primary", standard_page(3))],
    );
    first.run_once().await.unwrap();
    let before = first.store().load();
    let last_in = before.get("addr2").unwrap().last_inbound.clone();
    assert!(last_in.is_known());

    // Same list, but the last-inbound column is now garbage for every row.
    let page = standard_page(3)
        .body
        .replace(" 12:00:00 UTC</td><td>10", " noon</td><td>10");
    let second = pipeline(dir.path(), vec![MockSource::serving("primary", html_doc(page))]);
    let report = second.run_once().await.unwrap();

    assert_eq!(report.status, RunStatus::Success);
    let after = second.store().load();
    assert_eq!(after.get("addr2").unwrap().last_inbound, last_in);
    assert_eq!(after.get("addr2").unwrap().inbound_count, Field::Known(102));
}

#[tokio::test]
async fn degraded_run_leaves_snapshot_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("wallet.json"));
    let baseline = snapshot_of(&["a", "b", "c"]);
    store.save(&baseline).unwrap();
    let bytes_before = std::fs::read(store.path()).unwrap();

    let pipeline = pipeline(
        dir.path(),
        vec![
            MockSource::failing("primary", blocked()),
            MockSource::failing("secondary", transient()),
        ],
    );
    let report = pipeline.run_once().await.unwrap();

    assert_eq!(report.status, RunStatus::Degraded);
    assert_eq!(report.strategy, None);
    assert_eq!(report.records, 3);
    assert_eq!(std::fs::read(store.path()).unwrap(), bytes_before);

    let logs = run_logs(dir.path());
    assert_eq!(logs[0]["status"], "degraded");
    let events = logs[0]["events"].as_array().unwrap();
    assert!(events.iter().any(|e| e["type"] == "degraded"));
    assert!(!events.iter().any(|e| e["type"] == "snapshot_saved"));
}

#[tokio::test]
async fn no_sources_and_no_baseline_is_a_hard_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![MockSource::failing("primary", transient())]);

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, PipelineError::NoData));
    assert!(!pipeline.store().path().exists());
    assert_eq!(run_logs(dir.path())[0]["status"], "failed");
}

#[tokio::test]
async fn partial_list_is_padded_with_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), vec![MockSource::serving("primary", standard_page(40))]);

    let report = pipeline.run_once().await.unwrap();
    let stats = report.stats.unwrap();

    assert_eq!(stats.inserted, 40);
    assert_eq!(stats.placeholders, 60);
    let saved: Snapshot = pipeline.store().load();
    assert_eq!(saved.len(), 100);
    assert!(saved.records()[40].is_placeholder());
    assert_eq!(saved.records()[99].rank, 100);
}
