//! Delimited (CSV/TSV) extraction.
//!
//! Parsing escalates through three modes until one succeeds:
//! strict (quoted fields, uniform width), flexible (ragged rows padded or
//! truncated, blank lines skipped) and permissive (raw delimiter split,
//! quotes ignored). The permissive mode cannot fail.

use csv::ReaderBuilder;

use super::types::{NativeExtractor, NativeText};
use super::ExtractionError;
use crate::models::{DocumentFormat, ExtractedTable, TableSource};
use crate::pipeline::import::delimiter_for;

/// Rows rendered into the searchable native text.
const NATIVE_TEXT_ROWS: usize = 200;

/// Base confidence once the parser had to ignore quoting.
const PERMISSIVE_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Flexible,
    Permissive,
}

#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub mode: ParseMode,
    pub warnings: Vec<String>,
}

pub struct DelimitedExtractor {
    format: DocumentFormat,
}

impl DelimitedExtractor {
    pub fn new(format: DocumentFormat) -> Self {
        Self { format }
    }
}

impl NativeExtractor for DelimitedExtractor {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError> {
        let decoded = String::from_utf8_lossy(raw);
        let text = decoded.strip_prefix('\u{feff}').unwrap_or(&*decoded);
        let delimiter = delimiter_for(self.format, text);

        let parsed = parse_delimited(text, delimiter);
        let native_text = render_native_text(&parsed);
        let mut native = NativeText::full_coverage(native_text);
        native.warnings = parsed.warnings.clone();

        if !parsed.headers.is_empty() {
            let mut table = ExtractedTable::new(parsed.headers, parsed.rows, TableSource::DelimitedParser);
            if parsed.mode == ParseMode::Permissive {
                table.base_confidence = PERMISSIVE_CONFIDENCE;
            }
            table.warnings = parsed.warnings;
            native.tables.push(table);
        }
        Ok(native)
    }
}

/// Parse delimited text, escalating through the parse modes.
pub fn parse_delimited(text: &str, delimiter: char) -> ParsedTable {
    let delimiter = delimiter as u8;

    let (records, mode, mut warnings) = match parse_with_reader(text, delimiter, false) {
        Ok(records) => (records, ParseMode::Strict, Vec::new()),
        Err(strict_err) => {
            tracing::debug!(error = %strict_err, "Strict delimited parse failed, retrying flexibly");
            match parse_with_reader(text, delimiter, true) {
                Ok(records) => (
                    records,
                    ParseMode::Flexible,
                    vec![format!("Ragged rows normalized ({strict_err})")],
                ),
                Err(flexible_err) => {
                    tracing::warn!(
                        error = %flexible_err,
                        "Delimited input malformed, falling back to raw split"
                    );
                    (
                        parse_permissive(text, delimiter as char),
                        ParseMode::Permissive,
                        vec![format!("Quoting ignored, best-effort rows ({flexible_err})")],
                    )
                }
            }
        }
    };

    let mut records = records.into_iter();
    let Some(header_cells) = records.next() else {
        return ParsedTable {
            headers: Vec::new(),
            rows: Vec::new(),
            mode,
            warnings,
        };
    };

    let headers = normalize_headers(&header_cells);
    let width = headers.len();
    let mut reshaped = 0usize;
    let rows: Vec<Vec<String>> = records
        .map(|mut cells| {
            if cells.len() != width {
                reshaped += 1;
                cells.resize(width, String::new());
            }
            cells
        })
        .collect();
    if reshaped > 0 && mode == ParseMode::Strict {
        warnings.push(format!("{reshaped} rows reshaped to {width} columns"));
    }

    ParsedTable {
        headers,
        rows,
        mode,
        warnings,
    }
}

fn parse_with_reader(
    text: &str,
    delimiter: u8,
    flexible: bool,
) -> Result<Vec<Vec<String>>, ExtractionError> {
    if has_unbalanced_quotes(text) {
        return Err(ExtractionError::MalformedTabularInput(
            "unterminated quoted field".into(),
        ));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(flexible)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ExtractionError::MalformedTabularInput(e.to_string()))?;
        let cells: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if flexible && cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        records.push(cells);
    }
    Ok(records)
}

fn parse_permissive(text: &str, delimiter: char) -> Vec<Vec<String>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            line.split(delimiter)
                .map(|c| c.trim().trim_matches('"').trim().to_string())
                .collect()
        })
        .collect()
}

/// Doubled quotes inside a field come in pairs, so an odd total means a
/// field never closed.
fn has_unbalanced_quotes(text: &str) -> bool {
    text.matches('"').count() % 2 == 1
}

/// Blank names become `Column_N` (1-based); repeats get `_2`, `_3` suffixes.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.trim().is_empty() {
                format!("Column_{}", i + 1)
            } else {
                name.trim().to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

fn render_native_text(parsed: &ParsedTable) -> String {
    if parsed.headers.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(parsed.rows.len().min(NATIVE_TEXT_ROWS) + 1);
    lines.push(parsed.headers.join("\t"));
    lines.extend(
        parsed
            .rows
            .iter()
            .take(NATIVE_TEXT_ROWS)
            .map(|row| row.join("\t")),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_handles_quoted_fields() {
        let parsed = parse_delimited("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n", ',');
        assert_eq!(parsed.mode, ParseMode::Strict);
        assert_eq!(parsed.headers, vec!["name", "note"]);
        assert_eq!(parsed.rows[0], vec!["Smith, J", "said \"hi\""]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn ragged_rows_fall_back_to_flexible() {
        let parsed = parse_delimited("a,b,c\n1,2\n\n4,5,6,7\n", ',');
        assert_eq!(parsed.mode, ParseMode::Flexible);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0], vec!["1", "2", ""]);
        assert_eq!(parsed.rows[1], vec!["4", "5", "6"]);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn unterminated_quote_falls_back_to_permissive() {
        let parsed = parse_delimited("a,b\n\"open,2\n3,4\n", ',');
        assert_eq!(parsed.mode, ParseMode::Permissive);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0], vec!["open", "2"]);
        assert!(!parsed.warnings.is_empty());
    }

    #[test]
    fn headers_are_normalized() {
        let raw: Vec<String> = ["id", "", "id", "name", "id"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            normalize_headers(&raw),
            vec!["id", "Column_2", "id_2", "name", "id_3"]
        );
    }

    #[test]
    fn empty_input_yields_no_headers() {
        let parsed = parse_delimited("", ',');
        assert!(parsed.headers.is_empty());
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn header_only_file_is_an_empty_table() {
        let native = DelimitedExtractor::new(DocumentFormat::Csv)
            .extract(b"item,price\n")
            .unwrap();
        assert_eq!(native.tables.len(), 1);
        assert!(native.tables[0].rows.is_empty());
    }

    #[test]
    fn tsv_extracts_table_and_text() {
        let raw = b"item\tqty\nbolt\t4\nnut\t9\n";
        let native = DelimitedExtractor::new(DocumentFormat::Tsv).extract(raw).unwrap();
        assert_eq!(native.coverage(), 1.0);
        assert_eq!(native.tables.len(), 1);
        assert_eq!(native.tables[0].rows.len(), 2);
        assert_eq!(native.tables[0].base_confidence, 1.0);
        assert!(native.text().starts_with("item\tqty\nbolt\t4"));
    }

    #[test]
    fn semicolon_csv_is_sniffed() {
        let raw = b"a;b;c\n1;2;3\n4;5;6\n";
        let native = DelimitedExtractor::new(DocumentFormat::Csv).extract(raw).unwrap();
        assert_eq!(native.tables[0].headers, vec!["a", "b", "c"]);
    }

    #[test]
    fn permissive_lowers_base_confidence() {
        let native = DelimitedExtractor::new(DocumentFormat::Csv)
            .extract(b"a,b\n\"x,1\n")
            .unwrap();
        assert_eq!(native.tables[0].base_confidence, PERMISSIVE_CONFIDENCE);
        assert!(!native.warnings.is_empty());
    }

    #[test]
    fn native_text_is_bounded() {
        let mut raw = String::from("id,value\n");
        for i in 0..1_000 {
            raw.push_str(&format!("{i},v{i}\n"));
        }
        let native = DelimitedExtractor::new(DocumentFormat::Csv)
            .extract(raw.as_bytes())
            .unwrap();
        assert_eq!(native.tables[0].rows.len(), 1_000);
        assert_eq!(native.text().lines().count(), NATIVE_TEXT_ROWS + 1);
    }
}
