// Field normalizer: raw text fragment + declared kind -> canonical value or Missing.
// Every function here is total. A bad fragment costs one field, never the row.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use richlist_common::{Amount, Balance, EntityRecord, Field, RecentChange, Timestamp};

use crate::extract::{column, RawRow, CHANGE_WINDOWS};

/// `248,597 BTC ($16,235,420,119)` → magnitude, unit, optional parenthesized valuation.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d[\d,]*(?:\.\d+)?)\s*([^\s(]*)\s*(?:\(\s*([^\d\s()]*)\s*(\d[\d,]*(?:\.\d+)?)\s*([^\s)]*)\s*\))?",
    )
    .expect("valid regex")
});

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid regex"));

/// Fractional digits kept for `share_of_total`.
const SHARE_SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    AmountWithUnit,
    Percentage,
    Timestamp,
    IntegerCount,
    FreeText,
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalValue {
    Balance(Balance),
    Percentage(Decimal),
    Timestamp(Timestamp),
    Count(u64),
    Text(String),
    Identifier(String),
}

pub fn normalize(raw: &str, kind: FieldKind) -> Field<CanonicalValue> {
    match kind {
        FieldKind::AmountWithUnit => amount(raw).map(CanonicalValue::Balance),
        FieldKind::Percentage => percentage(raw).map(CanonicalValue::Percentage),
        FieldKind::Timestamp => timestamp(raw).map(CanonicalValue::Timestamp),
        FieldKind::IntegerCount => count(raw).map(CanonicalValue::Count),
        FieldKind::FreeText => free_text(raw).map(CanonicalValue::Text),
        FieldKind::Identifier => identifier(raw).map(CanonicalValue::Identifier),
    }
}

pub fn amount(raw: &str) -> Field<Balance> {
    let Some(caps) = AMOUNT_RE.captures(raw) else {
        return Field::Missing;
    };
    let Some(amount) = parse_decimal(&caps[1]) else {
        return Field::Missing;
    };

    let valuation = caps
        .get(4)
        .and_then(|m| parse_decimal(m.as_str()))
        .map(|value| {
            let prefix = caps.get(3).map_or("", |m| m.as_str());
            let suffix = caps.get(5).map_or("", |m| m.as_str());
            Amount {
                amount: value,
                unit: currency_unit(prefix, suffix),
            }
        });

    Field::Known(Balance {
        amount,
        unit: caps[2].to_string(),
        valuation: valuation.into(),
    })
}

pub fn percentage(raw: &str) -> Field<Decimal> {
    let Some(caps) = PERCENT_RE.captures(raw) else {
        return Field::Missing;
    };
    match Decimal::from_str(&caps[1]) {
        Ok(mut value) if value <= Decimal::ONE_HUNDRED => {
            value.rescale(SHARE_SCALE);
            Field::Known(value)
        }
        _ => Field::Missing,
    }
}

pub fn timestamp(raw: &str) -> Field<Timestamp> {
    Timestamp::parse(raw.trim()).into()
}

pub fn count(raw: &str) -> Field<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Field::Missing;
    }
    digits.parse::<u64>().ok().into()
}

pub fn free_text(raw: &str) -> Field<String> {
    Field::Known(raw.trim().to_string())
}

/// First token of the fragment, accepted only if it is plain ASCII alphanumeric.
pub fn identifier(raw: &str) -> Field<String> {
    match raw.split_whitespace().next() {
        Some(token) if token.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Field::Known(token.to_string())
        }
        _ => Field::Missing,
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', "")).ok()
}

fn currency_unit(prefix: &str, suffix: &str) -> String {
    let symbol = match prefix {
        "$" => "USD",
        "€" => "EUR",
        "£" => "GBP",
        "¥" => "JPY",
        other => other,
    };
    if suffix.is_empty() {
        symbol.to_string()
    } else {
        suffix.to_string()
    }
}

// --- Rows ---

/// A row after field normalization, before it is given a rank in the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    /// Rank as printed by the source. Used only for ordering.
    pub source_rank: Field<u64>,
    pub record: EntityRecord,
}

pub fn normalize_row(row: &RawRow) -> NormalizedRow {
    let cell = |i: usize| row.cells.get(i).map(String::as_str).unwrap_or("");

    let record = EntityRecord {
        identity_key: identifier(cell(column::ADDRESS)),
        rank: 0,
        balance: amount(cell(column::BALANCE)),
        share_of_total: percentage(cell(column::SHARE)),
        first_inbound: timestamp(cell(column::FIRST_IN)),
        last_inbound: timestamp(cell(column::LAST_IN)),
        inbound_count: count(cell(column::INS)),
        first_outbound: timestamp(cell(column::FIRST_OUT)),
        last_outbound: timestamp(cell(column::LAST_OUT)),
        outbound_count: count(cell(column::OUTS)),
        recent_change: recent_change(row),
        label: row
            .annotation
            .as_deref()
            .map_or(Field::Missing, free_text),
    };

    NormalizedRow {
        source_rank: count(cell(column::RANK)),
        record,
    }
}

/// Missing when the row has no change columns at all; otherwise the windows
/// that actually carry a value.
fn recent_change(row: &RawRow) -> Field<Vec<RecentChange>> {
    if row.cells.len() <= column::CHANGE_START {
        return Field::Missing;
    }

    let observations = CHANGE_WINDOWS
        .iter()
        .enumerate()
        .filter_map(|(i, &window_days)| {
            let raw = row.cells.get(column::CHANGE_START + i)?;
            let delta = raw.trim();
            if delta.is_empty() || delta == "-" || delta.eq_ignore_ascii_case("n/a") {
                return None;
            }
            Some(RecentChange {
                window_days,
                delta: delta.to_string(),
            })
        })
        .collect();

    Field::Known(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn amount_with_unit_and_valuation() {
        let balance = amount("248,597 BTC ($16,235,420,119)").into_option().unwrap();
        assert_eq!(balance.amount, dec("248597"));
        assert_eq!(balance.unit, "BTC");
        let valuation = balance.valuation.into_option().unwrap();
        assert_eq!(valuation.amount, dec("16235420119"));
        assert_eq!(valuation.unit, "USD");
    }

    #[test]
    fn amount_with_fraction_and_no_valuation() {
        let balance = amount("  94,643.29 BTC").into_option().unwrap();
        assert_eq!(balance.amount, dec("94643.29"));
        assert_eq!(balance.unit, "BTC");
        assert!(balance.valuation.is_missing());
    }

    #[test]
    fn amount_valuation_with_suffix_unit() {
        let balance = amount("10 ETH (25,000 USD)").into_option().unwrap();
        let valuation = balance.valuation.into_option().unwrap();
        assert_eq!(valuation.amount, dec("25000"));
        assert_eq!(valuation.unit, "USD");
    }

    #[test]
    fn amount_without_magnitude_is_missing() {
        assert!(amount("BTC").is_missing());
        assert!(amount("").is_missing());
        assert!(amount("n/a").is_missing());
    }

    #[test]
    fn percentage_fixed_precision() {
        assert_eq!(percentage("1.2345%").into_option().unwrap().to_string(), "1.2345");
        assert_eq!(percentage("5.1 %").into_option().unwrap().to_string(), "5.1000");
        assert_eq!(percentage("0.98765432%").into_option().unwrap().to_string(), "0.9877");
    }

    #[test]
    fn percentage_requires_marker_and_bounds() {
        assert!(percentage("1.2345").is_missing());
        assert!(percentage("").is_missing());
        assert!(percentage("150%").is_missing());
        assert!(percentage("100%").is_known());
    }

    #[test]
    fn timestamp_accepts_only_canonical_form() {
        assert!(timestamp(" 2024-01-01 00:00:00 UTC ").is_known());
        assert!(timestamp("2024-01-01").is_missing());
        assert!(timestamp("Jan 1, 2024").is_missing());
        assert!(timestamp("2024-02-30 00:00:00 UTC").is_missing());
        assert!(timestamp("").is_missing());
    }

    #[test]
    fn count_strips_non_digits() {
        assert_eq!(count("1,234"), Field::Known(1234));
        assert_eq!(count(" 56 txs"), Field::Known(56));
        assert!(count("").is_missing());
        assert!(count("-").is_missing());
        assert!(count("99999999999999999999999").is_missing());
    }

    #[test]
    fn free_text_keeps_empty_string() {
        assert_eq!(free_text("  Binance-coldwallet "), Field::Known("Binance-coldwallet".into()));
        assert_eq!(free_text("   "), Field::Known(String::new()));
    }

    #[test]
    fn identifier_takes_first_alphanumeric_token() {
        assert_eq!(
            identifier("34xp4vRoCGJym3xR7yCVPFHoCNxv4Twseo wallet: Binance"),
            Field::Known("34xp4vRoCGJym3xR7yCVPFHoCNxv4Twseo".into())
        );
        assert!(identifier("").is_missing());
        assert!(identifier("bc1q-not-valid").is_missing());
    }

    #[test]
    fn dispatch_matches_typed_helpers() {
        assert_eq!(
            normalize("12", FieldKind::IntegerCount),
            Field::Known(CanonicalValue::Count(12))
        );
        assert!(normalize("junk", FieldKind::Timestamp).is_missing());
        assert_eq!(
            normalize("", FieldKind::FreeText),
            Field::Known(CanonicalValue::Text(String::new()))
        );
    }

    fn raw_row(cells: &[&str], annotation: Option<&str>) -> RawRow {
        RawRow {
            cells: cells.iter().map(|c| c.to_string()).collect(),
            annotation: annotation.map(String::from),
        }
    }

    #[test]
    fn row_with_change_columns() {
        let row = raw_row(
            &[
                "1",
                "34xp4vRoCGJym3xR7yCVPFHoCNxv4Twseo",
                "248,597 BTC ($16,235,420,119)",
                "1.2483%",
                "2018-10-18 09:21:59 UTC",
                "2024-05-01 12:00:00 UTC",
                "1,024",
                "2019-01-01 00:00:00 UTC",
                "garbage",
                "458",
                "+1,200 BTC",
                "N/A",
            ],
            Some("Binance-coldwallet"),
        );
        let normalized = normalize_row(&row);
        let r = normalized.record;

        assert_eq!(normalized.source_rank, Field::Known(1));
        assert_eq!(r.key(), Some("34xp4vRoCGJym3xR7yCVPFHoCNxv4Twseo"));
        assert_eq!(r.inbound_count, Field::Known(1024));
        assert!(r.last_outbound.is_missing());
        assert_eq!(
            r.recent_change,
            Field::Known(vec![RecentChange {
                window_days: 7,
                delta: "+1,200 BTC".into()
            }])
        );
        assert_eq!(r.label, Field::Known("Binance-coldwallet".into()));
    }

    #[test]
    fn row_without_change_columns_marks_change_missing() {
        let row = raw_row(&["3", "abc123", "1 BTC", "0.1%", "", "", "", "", "", ""], None);
        let r = normalize_row(&row).record;
        assert!(r.recent_change.is_missing());
        assert!(r.label.is_missing());
        assert!(r.first_inbound.is_missing());
    }
}
