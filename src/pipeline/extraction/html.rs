//! HTML extraction: visible text plus every `<table>` as a native table.
//!
//! Markup is scanned with patterns rather than a DOM, so a table nested in
//! another table's cell ends the outer one early.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::types::{NativeExtractor, NativeText};
use super::ExtractionError;
use crate::models::{ExtractedTable, TableSource};

static HIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
        .unwrap()
});
static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap());
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)(?:</tr\s*>|$)").unwrap());
static CELL_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(th|td)\b[^>]*>").unwrap());
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(p|div|li|tr|h[1-6]|table|section|article|header|footer)\b[^>]*>")
        .unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static NBSP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)&nbsp;|&#160;").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{0,31});").unwrap());

pub struct HtmlExtractor;

impl NativeExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError> {
        let decoded = String::from_utf8_lossy(raw);
        let markup = HIDDEN.replace_all(&decoded, " ");

        let mut native = NativeText::full_coverage(visible_text(&markup));
        for (index, body) in TABLE.captures_iter(&markup).enumerate() {
            match parse_table(&body[1]) {
                Some(table) => native.tables.push(table),
                None => tracing::debug!(index, "Skipping HTML table without data rows"),
            }
        }
        Ok(native)
    }
}

/// Text with block elements on their own lines and inline runs collapsed.
fn visible_text(markup: &str) -> String {
    let broken = BLOCK_BREAK.replace_all(markup, "\n");
    let stripped = TAG.replace_all(&broken, " ");
    decode_entities(&stripped)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First row is the header row, whether it uses `th` or `td`. Data rows
/// are padded or cut to the header width.
fn parse_table(body: &str) -> Option<ExtractedTable> {
    let mut rows = ROW
        .captures_iter(body)
        .map(|row| row_cells(&row[1]))
        .filter(|cells| !cells.is_empty());

    let headers = rows.next()?;
    let width = headers.len();
    let data: Vec<Vec<String>> = rows
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();
    if data.is_empty() {
        return None;
    }
    Some(ExtractedTable::new(headers, data, TableSource::Markup))
}

/// Cells run from one opening `th`/`td` to the next, so omitted closing
/// tags still split correctly.
fn row_cells(row: &str) -> Vec<String> {
    let opens: Vec<_> = CELL_OPEN.find_iter(row).collect();
    opens
        .iter()
        .enumerate()
        .map(|(i, open)| {
            let end = opens.get(i + 1).map_or(row.len(), |next| next.start());
            cell_text(&row[open.end()..end])
        })
        .collect()
}

fn cell_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// XML entities and character references. Unknown named entities stay as
/// written.
fn decode_entities(text: &str) -> String {
    let spaced = NBSP.replace_all(text, " ");
    ENTITY
        .replace_all(&spaced, |caps: &Captures| {
            quick_xml::escape::unescape(&caps[0])
                .map(Cow::into_owned)
                .unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
