// Test mocks and fixtures for the acquisition pipeline.
//
// - MockSource (SourceAdapter): scripted queue of fetch results, then a fallback
// - Page builders: ranked-list HTML in the layout the extractor expects
// - Record/snapshot helpers for reconcile and store tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use richlist_common::{
    DocumentFormat, EntityRecord, Field, RawDocument, Snapshot, DEFAULT_TABLE_MARKER,
};

use crate::cascade::Strategy;
use crate::error::FetchError;
use crate::extract::Extractor;
use crate::sources::{RetryPolicy, SourceAdapter};

pub const TEST_URL: &str = "https://richlist.test/top-100.html";

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Returns scripted results in order; once the script runs out, every call
/// returns the fallback. Builder pattern: `.then_ok()`, `.then_err()`, `.otherwise()`.
pub struct MockSource {
    name: String,
    script: Mutex<VecDeque<Result<RawDocument, FetchError>>>,
    fallback: Result<RawDocument, FetchError>,
    calls: Arc<AtomicU32>,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Err(FetchError::Transient("mock script exhausted".into())),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Always serves `doc`.
    pub fn serving(name: &str, doc: RawDocument) -> Self {
        Self::new(name).otherwise(Ok(doc))
    }

    /// Always fails with `err`.
    pub fn failing(name: &str, err: FetchError) -> Self {
        Self::new(name).otherwise(Err(err))
    }

    pub fn then_ok(self, doc: RawDocument) -> Self {
        self.push(Ok(doc))
    }

    pub fn then_err(self, err: FetchError) -> Self {
        self.push(Err(err))
    }

    pub fn otherwise(mut self, result: Result<RawDocument, FetchError>) -> Self {
        self.fallback = result;
        self
    }

    /// Shared call counter, still readable after the source is boxed into a strategy.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    fn push(self, result: Result<RawDocument, FetchError>) -> Self {
        self.script
            .lock()
            .expect("mock lock poisoned")
            .push_back(result);
        self
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("mock lock poisoned").pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn call_count(calls: &Arc<AtomicU32>) -> u32 {
    calls.load(Ordering::SeqCst)
}

/// Strategy over a mock, extracting with the default table marker.
pub fn mock_strategy(source: MockSource) -> Strategy {
    Strategy::new(Box::new(source), Extractor::new(Some(DEFAULT_TABLE_MARKER)))
}

/// Retry policy that never sleeps.
pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
}

pub fn blocked() -> FetchError {
    FetchError::Blocked {
        status: Some(403),
        reason: "access denied (HTTP 403)".into(),
    }
}

pub fn transient() -> FetchError {
    FetchError::Transient("HTTP 502".into())
}

// ---------------------------------------------------------------------------
// Page builders
// ---------------------------------------------------------------------------

/// One wallet row in source layout. Counts and dates are derived from `rank`
/// so every row is distinct and fully populated.
pub struct WalletRow {
    pub rank: u32,
    pub address: String,
    pub balance: String,
    pub label: Option<String>,
    pub changes: Option<(String, String)>,
}

impl WalletRow {
    pub fn new(rank: u32, address: &str) -> Self {
        Self {
            rank,
            address: address.to_string(),
            balance: format!("{} BTC ($1,000,000)", 10_000 - rank),
            label: None,
            changes: None,
        }
    }

    pub fn balance(mut self, balance: &str) -> Self {
        self.balance = balance.to_string();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn changes(mut self, week: &str, month: &str) -> Self {
        self.changes = Some((week.to_string(), month.to_string()));
        self
    }

    pub fn to_html(&self) -> String {
        let address = match &self.label {
            Some(label) => format!(
                r#"<a href="/address/{0}">{0}</a> <small>{1}</small>"#,
                self.address, label
            ),
            None => format!(r#"<a href="/address/{0}">{0}</a>"#, self.address),
        };
        let mut cells = vec![
            self.rank.to_string(),
            address,
            self.balance.clone(),
            "1.2345%".to_string(),
            "2019-01-01 00:00:00 UTC".to_string(),
            format!("2024-01-{:02} 12:00:00 UTC", self.rank % 28 + 1),
            format!("{}", 100 + self.rank),
            "2019-02-01 00:00:00 UTC".to_string(),
            format!("2024-02-{:02} 12:00:00 UTC", self.rank % 28 + 1),
            format!("{}", 50 + self.rank),
        ];
        if let Some((week, month)) = &self.changes {
            cells.push(week.clone());
            cells.push(month.clone());
        }
        let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
        format!("<tr>{tds}</tr>")
    }
}

/// `n` rows with addresses `addr1..addrN`.
pub fn wallet_rows(n: u32) -> Vec<WalletRow> {
    (1..=n).map(|i| WalletRow::new(i, &format!("addr{i}"))).collect()
}

const HEADER_LABELS: [&str; 10] = [
    "#", "Address", "Balance", "% of coins", "First In", "Last In", "Ins", "First Out", "Last Out",
    "Outs",
];

/// A full page with the ranked list in a table carrying `table_id`.
pub fn ranked_page(table_id: Option<&str>, rows: &[WalletRow]) -> String {
    page(table_id, "th", rows)
}

/// Same layout, but the header row is written with `<td>` cells.
pub fn td_header_page(table_id: Option<&str>, rows: &[WalletRow]) -> String {
    page(table_id, "td", rows)
}

fn page(table_id: Option<&str>, header_tag: &str, rows: &[WalletRow]) -> String {
    let id_attr = table_id.map(|id| format!(r#" id="{id}""#)).unwrap_or_default();
    let header: String = HEADER_LABELS
        .iter()
        .map(|label| format!("<{header_tag}>{label}</{header_tag}>"))
        .collect();
    let body: String = rows.iter().map(WalletRow::to_html).collect();
    format!(
        r#"<html><head><title>Top 100 Richest</title></head><body>
<table class="nav"><tr><td>Home</td><td>Charts</td></tr></table>
<table{id_attr} class="table table-striped">
<tr>{header}</tr>
{body}
</table>
</body></html>"#
    )
}

pub fn html_doc(body: String) -> RawDocument {
    RawDocument {
        url: TEST_URL.to_string(),
        body,
        format: DocumentFormat::Html,
    }
}

pub fn json_doc(body: String) -> RawDocument {
    RawDocument {
        url: "https://mirror.richlist.test/top-100.json".to_string(),
        body,
        format: DocumentFormat::Json,
    }
}

/// Ranked-list page with `n` rows under the default table marker.
pub fn standard_page(n: u32) -> RawDocument {
    html_doc(ranked_page(Some(DEFAULT_TABLE_MARKER), &wallet_rows(n)))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Identified record with every other field Missing.
pub fn record(key: &str, rank: u32) -> EntityRecord {
    EntityRecord {
        identity_key: Field::Known(key.to_string()),
        ..EntityRecord::placeholder(rank)
    }
}

/// Snapshot of bare records ranked in slice order.
pub fn snapshot_of(keys: &[&str]) -> Snapshot {
    Snapshot::new(
        keys.iter()
            .enumerate()
            .map(|(i, key)| record(key, (i + 1) as u32))
            .collect(),
    )
}
