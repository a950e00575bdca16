//! Row-count ceilings for every table-shaped output.
//!
//! One code path for every source format. Three layers, each with its own
//! ceiling: storage (once, before persistence), preview (task results and
//! document detail), response (every read).

use serde::Serialize;

use crate::config::EngineConfig;
use crate::models::{Row, Table, Truncation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingLayer {
    Storage,
    Preview,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceilings {
    pub storage: usize,
    pub preview: usize,
    pub response: usize,
}

impl From<&EngineConfig> for Ceilings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            storage: config.storage_ceiling,
            preview: config.preview_ceiling,
            response: config.response_ceiling,
        }
    }
}

/// A page of rows cut from an already storage-capped table.
#[derive(Debug, Clone, Serialize)]
pub struct TableWindow {
    pub table_index: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub offset: usize,
    pub limit: usize,
    /// Rows available in storage (after the storage ceiling).
    pub stored_row_count: usize,
    pub has_more: bool,
    #[serde(flatten)]
    pub truncation: Truncation,
}

#[derive(Debug, Clone)]
pub struct ResultLimiter {
    ceilings: Ceilings,
}

impl ResultLimiter {
    pub fn new(ceilings: Ceilings) -> Self {
        Self { ceilings }
    }

    pub fn ceilings(&self) -> Ceilings {
        self.ceilings
    }

    pub fn ceiling(&self, layer: CeilingLayer) -> usize {
        match layer {
            CeilingLayer::Storage => self.ceilings.storage,
            CeilingLayer::Preview => self.ceilings.preview,
            CeilingLayer::Response => self.ceilings.response,
        }
    }

    /// A caller may ask for fewer rows than the layer allows, never more.
    pub fn effective_ceiling(&self, layer: CeilingLayer, requested: Option<usize>) -> usize {
        let layer_ceiling = self.ceiling(layer);
        match requested {
            Some(n) => n.min(layer_ceiling),
            None => layer_ceiling,
        }
    }

    /// Truncate `table` to at most `ceiling` rows, keeping original order.
    ///
    /// `original_row_count` is the table's true count however many times it
    /// has been capped, and the applied ceiling only ever shrinks.
    pub fn cap(table: &Table, ceiling: usize) -> (Table, Truncation) {
        let applied = table.applied_ceiling.min(ceiling);
        let rows: Vec<Row> = table.rows.iter().take(applied).cloned().collect();
        rebuild(table, rows, applied)
    }

    /// Owned variant of [`ResultLimiter::cap`]; truncates in place.
    pub fn cap_owned(mut table: Table, ceiling: usize) -> (Table, Truncation) {
        let applied = table.applied_ceiling.min(ceiling);
        table.rows.truncate(applied);
        let truncation = truncation_for(table.rows.len(), table.true_row_count, applied);
        table.applied_ceiling = applied;
        table.is_truncated = truncation.is_truncated;
        (table, truncation)
    }

    pub fn cap_for(
        &self,
        layer: CeilingLayer,
        table: &Table,
        requested: Option<usize>,
    ) -> (Table, Truncation) {
        Self::cap(table, self.effective_ceiling(layer, requested))
    }

    pub fn cap_all(
        &self,
        layer: CeilingLayer,
        tables: &[Table],
        requested: Option<usize>,
    ) -> Vec<Table> {
        let ceiling = self.effective_ceiling(layer, requested);
        tables.iter().map(|t| Self::cap(t, ceiling).0).collect()
    }

    /// Deterministic window over stored rows. `limit` is clamped to the
    /// response ceiling so no page exceeds what a single read may return.
    pub fn paginate(&self, table: &Table, offset: usize, limit: usize) -> TableWindow {
        let limit = self.effective_ceiling(CeilingLayer::Response, Some(limit));
        let applied = table.applied_ceiling.min(limit);
        let rows: Vec<Row> = table.rows.iter().skip(offset).take(limit).cloned().collect();
        let has_more = offset.saturating_add(rows.len()) < table.rows.len();
        let truncation = truncation_for(rows.len(), table.true_row_count, applied);

        TableWindow {
            table_index: table.index,
            headers: table.headers.clone(),
            rows,
            offset,
            limit,
            stored_row_count: table.rows.len(),
            has_more,
            truncation,
        }
    }
}

fn truncation_for(kept: usize, true_count: usize, applied: usize) -> Truncation {
    Truncation {
        is_truncated: kept < true_count,
        original_row_count: true_count,
        applied_ceiling: applied,
    }
}

fn rebuild(table: &Table, rows: Vec<Row>, applied: usize) -> (Table, Truncation) {
    let truncation = truncation_for(rows.len(), table.true_row_count, applied);
    let capped = Table {
        index: table.index,
        headers: table.headers.clone(),
        rows,
        true_row_count: table.true_row_count,
        applied_ceiling: applied,
        is_truncated: truncation.is_truncated,
        table_type: table.table_type,
        confidence: table.confidence,
        source: table.source,
        column_types: table.column_types.clone(),
        page_number: table.page_number,
        warnings: table.warnings.clone(),
    };
    (capped, truncation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{keyed_row, TableSource, TableType};

    fn make_table(row_count: usize) -> Table {
        let headers = vec!["id".to_string(), "value".to_string()];
        let rows = (0..row_count)
            .map(|i| keyed_row(&headers, &[i.to_string(), format!("v{i}")]))
            .collect();
        Table {
            index: 0,
            headers,
            rows,
            true_row_count: row_count,
            applied_ceiling: usize::MAX,
            is_truncated: false,
            table_type: TableType::Data,
            confidence: 1.0,
            source: TableSource::DelimitedParser,
            column_types: vec![],
            page_number: None,
            warnings: vec![],
        }
    }

    fn limiter() -> ResultLimiter {
        ResultLimiter::new(Ceilings {
            storage: 10_000,
            preview: 50,
            response: 100,
        })
    }

    #[test]
    fn cap_bounds_rows_for_every_ceiling() {
        for row_count in [0usize, 1, 7, 64] {
            let table = make_table(row_count);
            for ceiling in 0..=row_count + 3 {
                let (capped, meta) = ResultLimiter::cap(&table, ceiling);
                assert!(capped.rows.len() <= ceiling);
                assert!(capped.rows.len() <= capped.applied_ceiling);
                assert_eq!(meta.original_row_count, row_count);
                assert_eq!(capped.true_row_count, row_count);
                assert_eq!(meta.is_truncated, ceiling < row_count);
            }
        }
    }

    #[test]
    fn cap_zero_on_nonempty_table_truncates_everything() {
        let (capped, meta) = ResultLimiter::cap(&make_table(5), 0);
        assert!(capped.rows.is_empty());
        assert!(meta.is_truncated);
        assert_eq!(meta.original_row_count, 5);
        assert_eq!(meta.applied_ceiling, 0);
    }

    #[test]
    fn cap_on_empty_table_never_truncated() {
        for ceiling in [0, 1, 100] {
            let (_, meta) = ResultLimiter::cap(&make_table(0), ceiling);
            assert!(!meta.is_truncated);
            assert_eq!(meta.original_row_count, 0);
        }
    }

    #[test]
    fn cap_preserves_original_order() {
        let (capped, _) = ResultLimiter::cap(&make_table(10), 4);
        let ids: Vec<&str> = capped
            .rows
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn repeated_capping_keeps_true_count() {
        let (stored, _) = ResultLimiter::cap_owned(make_table(300), 200);
        assert_eq!(stored.rows.len(), 200);
        let (again, meta) = ResultLimiter::cap(&stored, 20);
        assert_eq!(again.rows.len(), 20);
        assert_eq!(meta.original_row_count, 300);

        // A larger later ceiling cannot resurrect dropped rows.
        let (wide, meta) = ResultLimiter::cap(&stored, 1_000);
        assert_eq!(wide.rows.len(), 200);
        assert_eq!(meta.applied_ceiling, 200);
        assert!(meta.is_truncated);
    }

    #[test]
    fn response_never_exceeds_storage_or_request() {
        let limiter = ResultLimiter::new(Ceilings {
            storage: 30,
            preview: 10,
            response: 100,
        });
        let (stored, _) = ResultLimiter::cap_owned(make_table(500), limiter.ceiling(CeilingLayer::Storage));
        for requested in [None, Some(5), Some(30), Some(1_000)] {
            let (out, _) = limiter.cap_for(CeilingLayer::Response, &stored, requested);
            let bound = requested.unwrap_or(usize::MAX).min(30);
            assert!(out.rows.len() <= bound, "{requested:?}");
        }
    }

    #[test]
    fn five_thousand_row_scenario() {
        let limiter = limiter();
        let (stored, meta) =
            ResultLimiter::cap_owned(make_table(5_000), limiter.ceiling(CeilingLayer::Storage));
        assert_eq!(stored.rows.len(), 5_000);
        assert!(!meta.is_truncated);

        let (preview, meta) = limiter.cap_for(CeilingLayer::Preview, &stored, None);
        assert_eq!(preview.rows.len(), 50);
        assert!(meta.is_truncated);
        assert_eq!(meta.original_row_count, 5_000);

        let (listing, meta) = limiter.cap_for(CeilingLayer::Response, &stored, None);
        assert_eq!(listing.rows.len(), 100);
        assert!(meta.is_truncated);
    }

    #[test]
    fn paginate_windows_deterministically() {
        let limiter = limiter();
        let (stored, _) = ResultLimiter::cap_owned(make_table(250), 10_000);

        let first = limiter.paginate(&stored, 0, 100);
        assert_eq!(first.rows.len(), 100);
        assert!(first.has_more);
        assert_eq!(first.rows[0]["id"], "0");

        let last = limiter.paginate(&stored, 200, 100);
        assert_eq!(last.rows.len(), 50);
        assert!(!last.has_more);
        assert_eq!(last.rows[0]["id"], "200");
        assert_eq!(last.truncation.original_row_count, 250);
    }

    #[test]
    fn paginate_clamps_limit_to_response_ceiling() {
        let limiter = limiter();
        let (stored, _) = ResultLimiter::cap_owned(make_table(1_000), 10_000);
        let window = limiter.paginate(&stored, 0, 5_000);
        assert_eq!(window.limit, 100);
        assert_eq!(window.rows.len(), 100);
        assert!(window.truncation.is_truncated);
    }

    #[test]
    fn paginate_past_end_is_empty() {
        let window = limiter().paginate(&make_table(3), 10, 5);
        assert!(window.rows.is_empty());
        assert!(!window.has_more);
    }
}
