// Mirrors that publish the list as JSON, one flat object per row, using the
// same key names as the HTML-era wallet dumps.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{RawRow, CHANGE_WINDOWS, MIN_COLUMNS};

/// Accepted key names per canonical column, in column order.
const BASE_KEYS: [&[&str]; MIN_COLUMNS] = [
    &["rank"],
    &["address"],
    &["balance"],
    &["percentage"],
    &["first_in"],
    &["last_in"],
    &["ins"],
    &["first_out"],
    &["last_out"],
    &["outs"],
];

/// `7d:+12 BTC / 30d:-3 BTC`
static COMBINED_CHANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)d\s*:\s*([^/]*)").expect("valid regex"));

/// Locate the row array: the root itself, or an array of objects under a
/// top-level key. Keys are visited in `serde_json::Map` order, which is
/// sorted rather than document order.
pub(crate) fn row_array(root: &Value) -> Option<&Vec<Value>> {
    match root {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.values().find_map(|v| match v {
            Value::Array(items) if items.first().is_some_and(Value::is_object) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

/// `None` when a base key is absent: the row cannot be interpreted.
pub(crate) fn row(item: &Value) -> Option<RawRow> {
    let obj = item.as_object()?;

    let mut cells = BASE_KEYS
        .iter()
        .map(|aliases| lookup(obj, aliases))
        .collect::<Option<Vec<String>>>()?;

    if let Some(changes) = change_cells(obj) {
        cells.extend(changes);
    }

    let annotation = lookup(obj, &["owner", "label"]);

    Some(RawRow { cells, annotation })
}

fn lookup(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| obj.get(*key)).map(scalar_text)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One cell per entry in `CHANGE_WINDOWS`, or `None` if the object carries no change data.
fn change_cells(obj: &Map<String, Value>) -> Option<Vec<String>> {
    let split: Vec<Option<String>> = CHANGE_WINDOWS
        .iter()
        .map(|w| obj.get(&format!("change_{w}d")).map(scalar_text))
        .collect();
    if split.iter().any(Option::is_some) {
        return Some(split.into_iter().map(Option::unwrap_or_default).collect());
    }

    let combined = obj.get("change").map(scalar_text)?;
    let mut cells = vec![String::new(); CHANGE_WINDOWS.len()];
    for caps in COMBINED_CHANGE_RE.captures_iter(&combined) {
        let Ok(window) = caps[1].parse::<u32>() else {
            continue;
        };
        if let Some(i) = CHANGE_WINDOWS.iter().position(|&w| w == window) {
            cells[i] = caps[2].trim().to_string();
        }
    }
    Some(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "rank": "1",
            "address": "34xp4vRoCGJym3xR7yCVPFHoCNxv4Twseo",
            "balance": "248,597 BTC ($16,235,420,119)",
            "percentage": "1.2483%",
            "first_in": "2018-10-18 09:21:59 UTC",
            "last_in": "2024-05-01 12:00:00 UTC",
            "ins": "1024",
            "first_out": "2019-01-01 00:00:00 UTC",
            "last_out": "2024-04-01 00:00:00 UTC",
            "outs": 458
        })
    }

    #[test]
    fn finds_root_or_nested_array() {
        assert!(row_array(&json!([base()])).is_some());
        assert!(row_array(&json!({ "meta": 1, "wallets": [base()] })).is_some());
        assert!(row_array(&json!({ "tags": ["a"] })).is_none());
        assert!(row_array(&json!("nope")).is_none());
    }

    #[test]
    fn scalar_arrays_are_skipped_whatever_the_key_order() {
        for key in ["aaa", "zzz"] {
            let doc = json!({ key: ["x", "y"], "wallets": [base()] });
            let rows = row_array(&doc).unwrap();
            assert_eq!(rows[0]["rank"], "1");
        }
    }

    #[test]
    fn only_canonical_key_names_are_read() {
        let mut item = base();
        let obj = item.as_object_mut().unwrap();
        let address = obj.remove("address").unwrap();
        obj.insert("identity_key".into(), address);
        assert!(row(&item).is_none());

        let mut item = base();
        let obj = item.as_object_mut().unwrap();
        let share = obj.remove("percentage").unwrap();
        obj.insert("share_of_total".into(), share);
        assert!(row(&item).is_none());
    }

    #[test]
    fn numbers_become_text_cells() {
        let r = row(&base()).unwrap();
        assert_eq!(r.cells.len(), MIN_COLUMNS);
        assert_eq!(r.cells[9], "458");
        assert!(r.annotation.is_none());
    }

    #[test]
    fn missing_base_key_drops_row() {
        let mut item = base();
        item.as_object_mut().unwrap().remove("ins");
        assert!(row(&item).is_none());
    }

    #[test]
    fn combined_change_string_is_split() {
        let mut item = base();
        item["change"] = json!("7d:+12 BTC / 30d:N/A");
        item["owner"] = json!("Binance-coldwallet");
        let r = row(&item).unwrap();
        assert_eq!(&r.cells[10..], &["+12 BTC".to_string(), "N/A".to_string()]);
        assert_eq!(r.annotation.as_deref(), Some("Binance-coldwallet"));
    }

    #[test]
    fn split_change_keys_take_precedence() {
        let mut item = base();
        item["change_30d"] = json!("-3 BTC");
        item["change"] = json!("7d:+1 BTC / 30d:+2 BTC");
        let r = row(&item).unwrap();
        assert_eq!(&r.cells[10..], &[String::new(), "-3 BTC".to_string()]);
    }
}
