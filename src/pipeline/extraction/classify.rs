//! Uniform table post-processing.
//!
//! Every table, whatever produced it, goes through [`finalize_tables`]:
//! header-less tables are dropped, headers normalized, the table typed and
//! scored, and rows capped at the storage ceiling.

use std::sync::LazyLock;

use regex::Regex;

use super::tabular::normalize_headers;
use crate::models::{keyed_row, ColumnType, ExtractedTable, Table, TableType};
use crate::pipeline::limiter::ResultLimiter;

/// Rows sampled for classification keywords.
const CLASSIFY_SAMPLE_ROWS: usize = 5;

/// Values sampled per column for type inference.
const COLUMN_SAMPLE_VALUES: usize = 100;

/// Share of non-empty samples that must match for a column type to stick.
const COLUMN_TYPE_MAJORITY: f64 = 0.6;

const MALFORMED_CELL_CHARS: usize = 200;

const TYPE_KEYWORDS: &[(TableType, &[&str])] = &[
    (
        TableType::Financial,
        &["amount", "cost", "price", "revenue", "profit", "budget", "expense", "$"],
    ),
    (
        TableType::Contact,
        &["name", "email", "phone", "address", "contact", "person"],
    ),
    (
        TableType::Statistics,
        &["count", "average", "percentage", "rate", "metric", "total"],
    ),
    (
        TableType::Schedule,
        &["date", "time", "day", "month", "year", "schedule", "calendar"],
    ),
    (
        TableType::Inventory,
        &["quantity", "stock", "item", "product", "inventory"],
    ),
    (
        TableType::Performance,
        &["score", "rating", "performance", "result", "achievement"],
    ),
];

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-+]?\s*[$€£¥]\s*-?[\d,]*\.?\d+|-?[\d,]*\.?\d+\s*[$€£¥]|[A-Z]{3}\s*-?[\d,]*\.?\d+)$")
        .unwrap()
});
static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+(?:\.\d+)?\s*%$").unwrap());
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\d{4}-\d{1,2}-\d{1,2}(?:[t ]\d{1,2}:\d{2}(?::\d{2})?)?|\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4})$",
    )
    .unwrap()
});
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:\d{1,3}(?:,\d{3})+|\d+)?(?:\.\d+)?(?:[eE][-+]?\d+)?$").unwrap()
});

/// Post-process extracted tables into their persisted form.
pub fn finalize_tables(extracted: Vec<ExtractedTable>, storage_ceiling: usize) -> Vec<Table> {
    let mut tables = Vec::with_capacity(extracted.len());

    for candidate in extracted {
        if candidate.headers.iter().all(|h| h.trim().is_empty()) {
            tracing::debug!(
                source = candidate.source.as_str(),
                rows = candidate.rows.len(),
                "Dropping table without headers"
            );
            continue;
        }

        let headers = normalize_headers(&candidate.headers);
        let quality = quality_score(&candidate.rows, headers.len());
        let column_types = infer_column_types(&candidate.rows, headers.len());
        let table_type = classify_table(&headers, &candidate.rows);
        let rows = candidate
            .rows
            .iter()
            .map(|cells| keyed_row(&headers, cells))
            .collect::<Vec<_>>();

        let table = Table {
            index: tables.len(),
            true_row_count: rows.len(),
            headers,
            rows,
            applied_ceiling: usize::MAX,
            is_truncated: false,
            table_type,
            confidence: (candidate.base_confidence * quality).clamp(0.0, 1.0),
            source: candidate.source,
            column_types,
            page_number: candidate.page_number,
            warnings: candidate.warnings,
        };

        let (table, truncation) = ResultLimiter::cap_owned(table, storage_ceiling);
        if truncation.is_truncated {
            tracing::info!(
                table_index = table.index,
                original_rows = truncation.original_row_count,
                ceiling = truncation.applied_ceiling,
                "Table capped at storage ceiling"
            );
        }
        tables.push(table);
    }

    tables
}

/// Keyword presence over the headers; the earliest declared type wins a
/// tie. Sample rows are consulted only when no header keyword matches.
pub fn classify_table(headers: &[String], rows: &[Vec<String>]) -> TableType {
    let header_text = headers.join(" ").to_lowercase();
    if let Some(table_type) = best_keyword_match(&header_text) {
        return table_type;
    }

    let sample_text = rows
        .iter()
        .take(CLASSIFY_SAMPLE_ROWS)
        .flat_map(|r| r.iter())
        .map(|c| c.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    best_keyword_match(&sample_text).unwrap_or(TableType::Data)
}

fn best_keyword_match(text: &str) -> Option<TableType> {
    let mut best: Option<(TableType, usize)> = None;
    for (table_type, keywords) in TYPE_KEYWORDS {
        let score = keywords.iter().filter(|k| text.contains(*k)).count();
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((*table_type, score));
        }
    }
    best.map(|(table_type, _)| table_type)
}

/// `1 - (empty_ratio * 0.4 + malformed_ratio * 0.8)`, clamped to [0, 1].
pub fn quality_score(rows: &[Vec<String>], width: usize) -> f32 {
    let total = rows.len() * width;
    if total == 0 {
        return 1.0;
    }
    let mut empty = 0usize;
    let mut malformed = 0usize;
    for row in rows {
        for i in 0..width {
            match row.get(i) {
                None => empty += 1,
                Some(cell) if cell.trim().is_empty() => empty += 1,
                Some(cell) => {
                    if cell.chars().count() > MALFORMED_CELL_CHARS || cell.contains('\n') {
                        malformed += 1;
                    }
                }
            }
        }
    }
    let empty_ratio = empty as f32 / total as f32;
    let malformed_ratio = malformed as f32 / total as f32;
    (1.0 - (empty_ratio * 0.4 + malformed_ratio * 0.8)).clamp(0.0, 1.0)
}

pub fn infer_column_types(rows: &[Vec<String>], width: usize) -> Vec<ColumnType> {
    (0..width)
        .map(|col| {
            let samples: Vec<&str> = rows
                .iter()
                .filter_map(|r| r.get(col))
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .take(COLUMN_SAMPLE_VALUES)
                .collect();
            infer_column_type(&samples)
        })
        .collect()
}

fn infer_column_type(samples: &[&str]) -> ColumnType {
    if samples.is_empty() {
        return ColumnType::Text;
    }
    let candidates: [(ColumnType, &Regex); 4] = [
        (ColumnType::Currency, &CURRENCY),
        (ColumnType::Percentage, &PERCENTAGE),
        (ColumnType::Date, &DATE),
        (ColumnType::Numeric, &NUMERIC),
    ];
    for (column_type, pattern) in candidates {
        let hits = samples
            .iter()
            .filter(|v| column_type != ColumnType::Numeric || v.chars().any(|c| c.is_ascii_digit()))
            .filter(|v| pattern.is_match(v))
            .count();
        if hits as f64 / samples.len() as f64 >= COLUMN_TYPE_MAJORITY {
            return column_type;
        }
    }
    ColumnType::Text
}
