use serde::{Deserialize, Serialize};

use super::enums::{ColumnType, TableSource, TableType};

/// One record keyed by header name. Values are strings, or null for empty cells.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Truncation metadata carried alongside every capped table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub is_truncated: bool,
    pub original_row_count: usize,
    pub applied_ceiling: usize,
}

/// A table as returned by a collaborator, before post-processing.
/// Rows are positional here; they become keyed records once headers are
/// normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub source: TableSource,
    /// Confidence of the extraction method itself, before quality scoring.
    pub base_confidence: f32,
    pub page_number: Option<usize>,
    pub warnings: Vec<String>,
}

impl ExtractedTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, source: TableSource) -> Self {
        let base_confidence = match source {
            TableSource::DelimitedParser => 1.0,
            TableSource::NativeLayout | TableSource::Markup => 0.95,
            TableSource::RecognizedText => 0.7,
        };
        Self {
            headers,
            rows,
            source,
            base_confidence,
            page_number: None,
            warnings: Vec::new(),
        }
    }
}

/// A post-processed table, as persisted and served.
///
/// `rows.len() <= applied_ceiling` always holds and `true_row_count` is the
/// row count before any capping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub index: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub true_row_count: usize,
    pub applied_ceiling: usize,
    pub is_truncated: bool,
    pub table_type: TableType,
    pub confidence: f32,
    pub source: TableSource,
    #[serde(default)]
    pub column_types: Vec<ColumnType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Table {
    pub fn truncation(&self) -> Truncation {
        Truncation {
            is_truncated: self.is_truncated,
            original_row_count: self.true_row_count,
            applied_ceiling: self.applied_ceiling,
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Cell text in header order, empty string for null or missing cells.
    pub fn cells(&self, row: &Row) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| match row.get(h) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect()
    }
}

/// Build a keyed record from positional cells. Missing trailing cells map to null.
pub fn keyed_row(headers: &[String], cells: &[String]) -> Row {
    let mut row = Row::new();
    for (i, header) in headers.iter().enumerate() {
        let value = match cells.get(i) {
            Some(c) if !c.trim().is_empty() => serde_json::Value::String(c.clone()),
            _ => serde_json::Value::Null,
        };
        row.insert(header.clone(), value);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_row_pads_missing_cells_with_null() {
        let headers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let row = keyed_row(&headers, &["1".to_string(), "".to_string()]);
        assert_eq!(row["a"], "1");
        assert!(row["b"].is_null());
        assert!(row["c"].is_null());
    }

    #[test]
    fn cells_follow_header_order() {
        let headers = vec!["z".to_string(), "a".to_string()];
        let row = keyed_row(&headers, &["last".to_string(), "first".to_string()]);
        let table = Table {
            index: 0,
            headers,
            rows: vec![row.clone()],
            true_row_count: 1,
            applied_ceiling: 10,
            is_truncated: false,
            table_type: TableType::Data,
            confidence: 1.0,
            source: TableSource::DelimitedParser,
            column_types: vec![],
            page_number: None,
            warnings: vec![],
        };
        assert_eq!(table.cells(&row), vec!["last", "first"]);
    }

    #[test]
    fn serialized_table_is_self_describing() {
        let headers = vec!["name".to_string()];
        let table = Table {
            index: 2,
            headers: headers.clone(),
            rows: vec![keyed_row(&headers, &["x".to_string()])],
            true_row_count: 7,
            applied_ceiling: 1,
            is_truncated: true,
            table_type: TableType::Contact,
            confidence: 0.9,
            source: TableSource::NativeLayout,
            column_types: vec![ColumnType::Text],
            page_number: Some(3),
            warnings: vec![],
        };
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["headers"][0], "name");
        assert_eq!(json["rows"][0]["name"], "x");
        assert_eq!(json["true_row_count"], 7);
        assert_eq!(json["is_truncated"], true);
        assert_eq!(json["table_type"], "contact");
    }
}
