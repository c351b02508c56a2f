use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// --- Field ---

/// A record value that may be unknown.
///
/// `Missing` means "the source said nothing"; it serializes as JSON `null` so
/// the key is always present in the stored document. `Known("")` is a real,
/// empty value and is distinct from `Missing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Missing,
    Known(T),
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    pub fn is_known(&self) -> bool {
        !self.is_missing()
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Known(v) => Field::Known(f(v)),
            Field::Missing => Field::Missing,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Missing,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

// --- Timestamp ---

/// Canonical textual form: UTC, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} UTC$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Strict parse of the canonical form. No trimming, no guessing.
    pub fn parse(s: &str) -> Option<Self> {
        if !TIMESTAMP_RE.is_match(s) {
            return None;
        }
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| Timestamp(naive.and_utc()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("malformed timestamp: {raw:?}")))
    }
}

/// Stored timestamps that no longer match the canonical form load as `Missing`
/// instead of failing the whole document.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Field<Timestamp>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| Timestamp::parse(&s)).into())
}

// --- Record values ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: Decimal,
    pub unit: String,
}

/// Native-asset holding plus the optional fiat valuation shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Decimal,
    pub unit: String,
    #[serde(default)]
    pub valuation: Field<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChange {
    pub window_days: u32,
    pub delta: String,
}

// --- EntityRecord ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub identity_key: Field<String>,
    pub rank: u32,
    #[serde(default)]
    pub balance: Field<Balance>,
    #[serde(default)]
    pub share_of_total: Field<Decimal>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub first_inbound: Field<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_inbound: Field<Timestamp>,
    #[serde(default)]
    pub inbound_count: Field<u64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub first_outbound: Field<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_outbound: Field<Timestamp>,
    #[serde(default)]
    pub outbound_count: Field<u64>,
    #[serde(default)]
    pub recent_change: Field<Vec<RecentChange>>,
    #[serde(default)]
    pub label: Field<String>,
}

impl EntityRecord {
    /// An empty rank slot: no identity, every field missing.
    pub fn placeholder(rank: u32) -> Self {
        Self {
            identity_key: Field::Missing,
            rank,
            balance: Field::Missing,
            share_of_total: Field::Missing,
            first_inbound: Field::Missing,
            last_inbound: Field::Missing,
            inbound_count: Field::Missing,
            first_outbound: Field::Missing,
            last_outbound: Field::Missing,
            outbound_count: Field::Missing,
            recent_change: Field::Missing,
            label: Field::Missing,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.identity_key.as_option().map(String::as_str)
    }

    pub fn is_placeholder(&self) -> bool {
        self.identity_key.is_missing()
    }
}

// --- Snapshot ---

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotDefect {
    #[error("identity key {0} appears more than once")]
    DuplicateKey(String),

    #[error("rank sequence broken at position {position}: expected {expected}, found {found}")]
    RankGap {
        position: usize,
        expected: u32,
        found: u32,
    },
}

/// One run's ordered list of records. Serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: Vec<EntityRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<EntityRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<EntityRecord> {
        self.records
    }

    pub fn get(&self, key: &str) -> Option<&EntityRecord> {
        self.records.iter().find(|r| r.key() == Some(key))
    }

    pub fn placeholder_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_placeholder()).count()
    }

    /// Records that carry an identity key.
    pub fn identified_count(&self) -> usize {
        self.len() - self.placeholder_count()
    }

    /// Check the snapshot invariants: unique keys among real rows and a dense
    /// `1..N` rank sequence in order.
    pub fn validate(&self) -> Result<(), Vec<SnapshotDefect>> {
        let mut defects = Vec::new();
        let mut seen = HashSet::new();

        for (i, record) in self.records.iter().enumerate() {
            if let Some(key) = record.key() {
                if !seen.insert(key) {
                    defects.push(SnapshotDefect::DuplicateKey(key.to_string()));
                }
            }
            let expected = (i + 1) as u32;
            if record.rank != expected {
                defects.push(SnapshotDefect::RankGap {
                    position: i,
                    expected,
                    found: record.rank,
                });
            }
        }

        if defects.is_empty() {
            Ok(())
        } else {
            Err(defects)
        }
    }
}

// --- RawDocument ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Html,
    Json,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Html => write!(f, "html"),
            DocumentFormat::Json => write!(f, "json"),
        }
    }
}

/// Body returned by one source fetch, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub url: String,
    pub body: String,
    pub format: DocumentFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(key: &str, rank: u32) -> EntityRecord {
        EntityRecord {
            identity_key: Field::Known(key.to_string()),
            ..EntityRecord::placeholder(rank)
        }
    }

    #[test]
    fn missing_serializes_as_null_and_keeps_key() {
        let json = serde_json::to_value(EntityRecord::placeholder(7)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 12);
        assert!(obj["identity_key"].is_null());
        assert!(obj["label"].is_null());
        assert_eq!(obj["rank"], 7);
    }

    #[test]
    fn empty_label_is_not_missing() {
        let mut r = record("abc", 1);
        r.label = Field::Known(String::new());
        let json = serde_json::to_string(&r).unwrap();
        let back: EntityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.label, Field::Known(String::new()));
    }

    #[test]
    fn timestamp_parse_is_strict() {
        assert!(Timestamp::parse("2024-01-01 00:00:00 UTC").is_some());
        assert!(Timestamp::parse("2024-1-01 00:00:00 UTC").is_none());
        assert!(Timestamp::parse("2024-01-01 00:00:00").is_none());
        assert!(Timestamp::parse("2024-13-01 00:00:00 UTC").is_none());
        assert!(Timestamp::parse(" 2024-01-01 00:00:00 UTC").is_none());
        assert!(Timestamp::parse("").is_none());
    }

    #[test]
    fn timestamp_displays_canonical_form() {
        let ts = Timestamp::parse("2023-06-30 17:05:09 UTC").unwrap();
        assert_eq!(ts.to_string(), "2023-06-30 17:05:09 UTC");
    }

    #[test]
    fn malformed_stored_timestamp_loads_as_missing() {
        let mut json = serde_json::to_value(record("abc", 1)).unwrap();
        json["last_inbound"] = serde_json::json!("yesterday");
        json["first_inbound"] = serde_json::json!("2024-01-01 00:00:00 UTC");
        let back: EntityRecord = serde_json::from_value(json).unwrap();
        assert!(back.last_inbound.is_missing());
        assert!(back.first_inbound.is_known());
    }

    #[test]
    fn decimal_scale_survives_round_trip() {
        let mut r = record("abc", 1);
        r.share_of_total = Field::Known(Decimal::from_str("5.1000").unwrap());
        let json = serde_json::to_string(&r).unwrap();
        let back: EntityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.share_of_total.as_option().unwrap().to_string(), "5.1000");
    }

    #[test]
    fn validate_reports_duplicates_and_gaps() {
        let snap = Snapshot::new(vec![record("a", 1), record("a", 2), record("b", 4)]);
        let defects = snap.validate().unwrap_err();
        assert!(defects.contains(&SnapshotDefect::DuplicateKey("a".into())));
        assert!(defects.iter().any(|d| matches!(d, SnapshotDefect::RankGap { expected: 3, found: 4, .. })));
    }

    #[test]
    fn placeholders_may_repeat_without_defect() {
        let snap = Snapshot::new(vec![
            record("a", 1),
            EntityRecord::placeholder(2),
            EntityRecord::placeholder(3),
        ]);
        assert!(snap.validate().is_ok());
        assert_eq!(snap.placeholder_count(), 2);
        assert_eq!(snap.identified_count(), 1);
    }
}
