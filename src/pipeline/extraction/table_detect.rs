//! Table detection in free text (recognized pages, PDF text layers).
//!
//! A run of consecutive tabular lines becomes one table: the first line is
//! the header row, the rest are data rows.

use crate::models::{ExtractedTable, TableSource};

/// A run needs a header and at least one data row.
const MIN_TABLE_LINES: usize = 2;

/// Detect every table in `text`, in reading order.
pub fn detect_tables(text: &str, source: TableSource) -> Vec<ExtractedTable> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        if is_separator_line(line) {
            continue;
        }
        if is_tabular_line(line) {
            run.push(split_cells(line));
        } else {
            flush_run(&mut run, source, &mut tables);
        }
    }
    flush_run(&mut run, source, &mut tables);
    tables
}

fn flush_run(run: &mut Vec<Vec<String>>, source: TableSource, out: &mut Vec<ExtractedTable>) {
    if run.len() >= MIN_TABLE_LINES {
        let mut lines = std::mem::take(run).into_iter();
        if let Some(headers) = lines.next() {
            let width = headers.len();
            let rows = lines
                .map(|mut cells| {
                    cells.resize(width, String::new());
                    cells
                })
                .collect();
            out.push(ExtractedTable::new(headers, rows, source));
        }
    }
    run.clear();
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// - Tab-separated: "Item\tQty\tPrice"
/// - Pipe-separated: "Item | Qty | Price"
/// - Multi-space aligned: "Bolts    40    0.25"
pub fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 5 {
        return false;
    }

    if trimmed.matches('\t').count() >= 2 {
        return true;
    }
    if trimmed.matches('|').count() >= 2 {
        return true;
    }
    count_multi_space_gaps(trimmed) >= 2
}

/// Markdown rule lines such as `|---|:--:|`.
fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.contains('-')
        && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | '+' | ' '))
}

/// Split a tabular line using the strongest separator it contains.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let cells: Vec<&str> = if trimmed.matches('\t').count() >= 2 {
        trimmed.split('\t').collect()
    } else if trimmed.matches('|').count() >= 2 {
        trimmed
            .trim_start_matches('|')
            .trim_end_matches('|')
            .split('|')
            .collect()
    } else {
        split_on_gaps(trimmed)
    };
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

fn split_on_gaps(text: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut gap_start: Option<usize> = None;
    let mut gap_len = 0;

    for (i, ch) in text.char_indices() {
        if ch == ' ' {
            if gap_start.is_none() {
                gap_start = Some(i);
            }
            gap_len += 1;
        } else {
            if let Some(g) = gap_start {
                if gap_len >= 3 {
                    cells.push(&text[start..g]);
                    start = i;
                }
            }
            gap_start = None;
            gap_len = 0;
        }
    }
    cells.push(&text[start..]);
    cells
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut in_gap = false;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len >= 3 && !in_gap {
                in_gap = true;
                count += 1;
            }
        } else {
            in_gap = false;
            gap_len = 0;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_separated_is_tabular() {
        assert!(is_tabular_line("Name\tQty\tPrice"));
    }

    #[test]
    fn pipe_separated_is_tabular() {
        assert!(is_tabular_line("Name | Qty | Price"));
        assert!(is_tabular_line("| A | 4.2 | x |"));
    }

    #[test]
    fn aligned_columns_are_tabular() {
        assert!(is_tabular_line("Bolts     40     0.25"));
        assert!(!is_tabular_line("Bolts  40  0.25"));
    }

    #[test]
    fn prose_is_not_tabular() {
        assert!(!is_tabular_line("The quarterly report shows growth in all regions."));
        assert!(!is_tabular_line("a|b"));
        assert!(!is_tabular_line(""));
    }

    #[test]
    fn splits_on_gaps_only_when_wide() {
        assert_eq!(
            split_cells("Unit price    12.50   EUR total"),
            vec!["Unit price", "12.50", "EUR total"]
        );
    }

    #[test]
    fn detects_markdown_table_and_skips_rule() {
        let text = "Intro line\n| Item | Qty |\n|------|-----|\n| Bolt | 4 |\n| Nut | 9 |\nOutro";
        let tables = detect_tables(text, TableSource::RecognizedText);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Item", "Qty"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1], vec!["Nut", "9"]);
        assert_eq!(tables[0].source, TableSource::RecognizedText);
    }

    #[test]
    fn prose_breaks_tables_apart() {
        let text = "A\tB\tC\n1\t2\t3\nnot a table\nX\tY\tZ\n7\t8\t9\n";
        assert_eq!(detect_tables(text, TableSource::RecognizedText).len(), 2);
    }

    #[test]
    fn lone_tabular_line_is_not_a_table() {
        assert!(detect_tables("A\tB\tC\nprose", TableSource::RecognizedText).is_empty());
    }

    #[test]
    fn short_rows_are_padded() {
        let tables = detect_tables("A\tB\tC\n1\t2\t3\n4 | 5 |", TableSource::RecognizedText);
        assert_eq!(tables[0].rows[1].len(), 3);
    }
}
