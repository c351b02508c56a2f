//! Row extractor: finds the ranked list inside a raw document and returns its
//! rows as ordered text fragments. It never infers a missing column; rows it
//! cannot interpret are discarded and counted.

mod html;
mod json;

use richlist_common::{DocumentFormat, RawDocument};
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::normalize;

/// Canonical column order of a [`RawRow`].
pub mod column {
    pub const RANK: usize = 0;
    pub const ADDRESS: usize = 1;
    pub const BALANCE: usize = 2;
    pub const SHARE: usize = 3;
    pub const FIRST_IN: usize = 4;
    pub const LAST_IN: usize = 5;
    pub const INS: usize = 6;
    pub const FIRST_OUT: usize = 7;
    pub const LAST_OUT: usize = 8;
    pub const OUTS: usize = 9;
    /// Optional trailing columns, one per entry in `CHANGE_WINDOWS`.
    pub const CHANGE_START: usize = 10;
}

/// Rank through outbound count. Rows shorter than this are dropped.
pub const MIN_COLUMNS: usize = 10;

/// Day windows of the trailing change columns, in column order.
pub const CHANGE_WINDOWS: [u32; 2] = [7, 30];

/// Header-label groups used when the table marker is gone. A table qualifies
/// when its header hits at least `HEADER_GROUPS_REQUIRED` groups.
const HEADER_GROUPS: [&[&str]; 4] = [
    &["#", "rank", "rang", "ranking", "ранг", "排名", "順位", "순위"],
    &[
        "address", "adresse", "dirección", "direccion", "indirizzo", "endereço", "adres", "адрес",
        "地址", "アドレス", "주소",
    ],
    &[
        "balance", "saldo", "solde", "guthaben", "kontostand", "bilancio", "баланс", "余额", "餘額",
        "残高", "잔액",
    ],
    &["%"],
];
const HEADER_GROUPS_REQUIRED: usize = 3;

/// One source row as text fragments in `column` order, plus the owner
/// annotation found next to the address, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    table_marker: Option<String>,
}

impl Extractor {
    pub fn new(table_marker: Option<&str>) -> Self {
        Self {
            table_marker: table_marker.map(String::from),
        }
    }

    pub fn extract(&self, doc: &RawDocument) -> Result<Vec<RawRow>, ParseError> {
        match doc.format {
            DocumentFormat::Html => self.extract_html(&doc.body),
            DocumentFormat::Json => extract_json(&doc.body),
        }
    }

    fn extract_html(&self, body: &str) -> Result<Vec<RawRow>, ParseError> {
        let tables = html::tables(body);

        let mut selected: Vec<&html::Table> = match self.table_marker.as_deref() {
            Some(marker) => tables
                .iter()
                .filter(|t| t.id.is_some_and(|id| matches_marker(id, marker)))
                .collect(),
            None => Vec::new(),
        };
        let strategy = if selected.is_empty() {
            if let Some(marker) = self.table_marker.as_deref() {
                warn!(marker, "Table marker not found, trying header heuristic");
            }
            selected = tables.iter().filter(|t| header_matches(t.inner)).collect();
            "header_heuristic"
        } else {
            "marker"
        };

        if selected.is_empty() {
            return Err(ParseError::StructureNotFound {
                format: DocumentFormat::Html,
            });
        }

        let mut rows = Vec::new();
        let mut discarded = 0usize;
        for table in selected {
            let table_rows: Vec<Vec<html::Cell>> =
                html::rows(table.inner).into_iter().map(html::cells).collect();
            // Without <th> rows an unranked first row is the header, as in
            // `header_matches`. Headerless continuation tables keep their first row.
            let td_header = !table_rows.iter().any(|cells| is_header_row(cells));

            for (i, cells) in table_rows.iter().enumerate() {
                if cells.is_empty() || is_header_row(cells) {
                    continue;
                }
                let texts: Vec<String> = cells.iter().map(|c| html::text(c.html)).collect();
                if !has_rank(&texts) {
                    if !(td_header && i == 0) {
                        discarded += 1;
                    }
                    continue;
                }
                if cells.len() < MIN_COLUMNS {
                    discarded += 1;
                    continue;
                }
                rows.push(RawRow {
                    annotation: address_annotation(cells[column::ADDRESS].html),
                    cells: texts,
                });
            }
        }

        info!(strategy, rows = rows.len(), discarded, "Extracted HTML rows");
        Ok(rows)
    }
}

fn extract_json(body: &str) -> Result<Vec<RawRow>, ParseError> {
    let not_found = ParseError::StructureNotFound {
        format: DocumentFormat::Json,
    };
    let root: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        debug!(error = %e, "JSON document did not parse");
        not_found.clone()
    })?;
    let items = json::row_array(&root).ok_or(not_found)?;

    let rows: Vec<RawRow> = items
        .iter()
        .filter_map(json::row)
        .filter(|row| has_rank(&row.cells))
        .collect();
    info!(rows = rows.len(), discarded = items.len() - rows.len(), "Extracted JSON rows");
    Ok(rows)
}

fn is_header_row(cells: &[html::Cell]) -> bool {
    !cells.is_empty() && cells.iter().all(|c| c.header)
}

/// A row without a rank cell that reads as a count cannot be placed in the list.
fn has_rank(cells: &[String]) -> bool {
    cells
        .get(column::RANK)
        .is_some_and(|rank| normalize::count(rank).is_known())
}

/// `id` equals the marker, or the marker plus a numeric suffix (continuation tables).
fn matches_marker(id: &str, marker: &str) -> bool {
    id.strip_prefix(marker)
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

fn header_matches(table_inner: &str) -> bool {
    let rows = html::rows(table_inner);
    let header_cells: Vec<String> = rows
        .iter()
        .map(|r| html::cells(r))
        .filter(|cells| is_header_row(cells))
        .flatten()
        .map(|c| html::text(c.html).to_lowercase())
        .collect();

    // Tables without <th> rows: treat the first row as the header.
    let labels = if header_cells.is_empty() {
        rows.first()
            .map(|r| {
                html::cells(r)
                    .iter()
                    .map(|c| html::text(c.html).to_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        header_cells
    };

    let hits = HEADER_GROUPS
        .iter()
        .filter(|group| {
            labels
                .iter()
                .any(|label| group.iter().any(|word| label_has(label, word)))
        })
        .count();
    hits >= HEADER_GROUPS_REQUIRED
}

/// Symbols match anywhere; words must match a whole token so "in" does not hit "bitcoin".
fn label_has(label: &str, word: &str) -> bool {
    if !word.chars().any(char::is_alphanumeric) || !word.is_ascii() {
        return label.contains(word);
    }
    label
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Owner label: a `title` attribute on the address cell, else any text after
/// the address token.
fn address_annotation(cell_html: &str) -> Option<String> {
    if let Some(title) = html::title_attr(cell_html) {
        return Some(title);
    }
    let text = html::text(cell_html);
    let rest = text.split_once(' ').map(|(_, rest)| rest.trim())?;
    (!rest.is_empty()).then(|| rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_allows_numeric_continuation() {
        assert!(matches_marker("tblOne", "tblOne"));
        assert!(matches_marker("tblOne2", "tblOne"));
        assert!(!matches_marker("tblOneX", "tblOne"));
        assert!(!matches_marker("tbl", "tblOne"));
    }

    #[test]
    fn header_heuristic_is_translation_tolerant() {
        let german = "<tr><th>#</th><th>Adresse</th><th>Guthaben</th><th>% der Coins</th></tr>";
        assert!(header_matches(german));

        let unrelated = "<tr><th>Name</th><th>Price</th><th>Volume</th></tr>";
        assert!(!header_matches(unrelated));
    }

    #[test]
    fn header_words_match_whole_tokens() {
        assert!(label_has("richest address", "address"));
        assert!(!label_has("addresses", "address"));
        assert!(label_has("% of coins", "%"));
        assert!(label_has("地址", "地址"));
    }

    #[test]
    fn annotation_prefers_title() {
        assert_eq!(
            address_annotation(r#"<a href="/x">abc</a><span title="Exchange"></span>"#),
            Some("Exchange".into())
        );
        assert_eq!(
            address_annotation("<a>abc</a> <small>wallet: Binance</small>"),
            Some("wallet: Binance".into())
        );
        assert_eq!(address_annotation("<a>abc</a>"), None);
    }

    #[test]
    fn invalid_json_is_structure_not_found() {
        let doc = RawDocument {
            url: "https://mirror.example".into(),
            body: "<html>not json</html>".into(),
            format: DocumentFormat::Json,
        };
        assert_eq!(
            Extractor::default().extract(&doc),
            Err(ParseError::StructureNotFound {
                format: DocumentFormat::Json
            })
        );
    }
}
