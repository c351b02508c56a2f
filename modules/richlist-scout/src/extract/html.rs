// Regex-level HTML scanning. Rows and cells end at the next opening tag,
// so missing </tr> and </td> closers are fine.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<table\b([^>]*)>(.*?)</table\s*>").expect("valid regex")
});
static ID_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bid\s*=\s*["']?([^"'\s>]+)"#).expect("valid regex")
});
static ROW_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<tr\b[^>]*>").expect("valid regex"));
static CELL_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<t([dh])\b[^>]*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btitle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});

pub(crate) struct Table<'a> {
    pub id: Option<&'a str>,
    pub inner: &'a str,
}

pub(crate) struct Cell<'a> {
    pub header: bool,
    pub html: &'a str,
}

pub(crate) fn tables(html: &str) -> Vec<Table<'_>> {
    TABLE_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let inner = caps.get(2)?.as_str();
            let id = ID_ATTR_RE
                .captures(attrs)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str());
            Some(Table { id, inner })
        })
        .collect()
}

/// Raw HTML of each `<tr>`, up to the next `<tr>` or the end of the table.
pub(crate) fn rows(table_inner: &str) -> Vec<&str> {
    split_at_starts(table_inner, &ROW_START_RE)
}

pub(crate) fn cells(row: &str) -> Vec<Cell<'_>> {
    let starts: Vec<(usize, usize, bool)> = CELL_START_RE
        .captures_iter(row)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let header = caps[1].eq_ignore_ascii_case("h");
            Some((m.start(), m.end(), header))
        })
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, content_start, header))| {
            let end = starts.get(i + 1).map_or(row.len(), |next| next.0);
            Cell {
                header,
                html: &row[content_start..end],
            }
        })
        .collect()
}

/// Visible text: tags dropped, entities decoded, whitespace collapsed.
pub(crate) fn text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `title="..."` attribute inside the fragment.
pub(crate) fn title_attr(html: &str) -> Option<String> {
    let caps = TITLE_RE.captures(html)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(text(raw))
}

fn split_at_starts<'a>(s: &'a str, start_re: &Regex) -> Vec<&'a str> {
    let starts: Vec<(usize, usize)> = start_re.find_iter(s).map(|m| (m.start(), m.end())).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, content_start))| {
            let end = starts.get(i + 1).map_or(s.len(), |next| next.0);
            &s[content_start..end]
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "nbsp" => Some(' '),
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_capture_id() {
        let html = r#"<table class="x" id='tblOne'><tr><td>a</td></tr></table><table><tr></tr></table>"#;
        let found = tables(html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, Some("tblOne"));
        assert_eq!(found[1].id, None);
    }

    #[test]
    fn rows_and_cells_without_closers() {
        let inner = "<tr><th>#<th>Address<tr class=r><td>1<td>abc</td></tr>";
        let rows = rows(inner);
        assert_eq!(rows.len(), 2);

        let header = cells(rows[0]);
        assert!(header.iter().all(|c| c.header));
        assert_eq!(text(header[1].html), "Address");

        let body = cells(rows[1]);
        assert_eq!(body.len(), 2);
        assert!(!body[0].header);
        assert_eq!(text(body[1].html), "abc");
    }

    #[test]
    fn text_decodes_entities_and_collapses_whitespace() {
        assert_eq!(
            text("<b>248,597&nbsp;BTC</b>\n   ($16&#44;235)&amp;&unknown;"),
            "248,597 BTC ($16,235)&&unknown;"
        );
    }

    #[test]
    fn title_attribute_is_extracted() {
        let cell = r#"<a href="/a">abc</a> <span title="Binance &amp; Co">x</span>"#;
        assert_eq!(title_attr(cell), Some("Binance & Co".to_string()));
        assert_eq!(title_attr("<a>abc</a>"), None);
    }
}
