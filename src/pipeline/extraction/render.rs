use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::pipeline::limiter::TableWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Json,
    Csv,
    Markdown,
    Html,
}

impl RenderFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            RenderFormat::Json => "application/json",
            RenderFormat::Csv => "text/csv; charset=utf-8",
            RenderFormat::Markdown => "text/markdown; charset=utf-8",
            RenderFormat::Html => "text/html; charset=utf-8",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(RenderFormat::Json),
            "csv" => Ok(RenderFormat::Csv),
            "markdown" | "md" => Ok(RenderFormat::Markdown),
            "html" => Ok(RenderFormat::Html),
            other => Err(ExtractionError::UnknownRenderFormat(other.to_string())),
        }
    }
}

/// Cells of each row in header order. Null cells render empty.
fn cell_rows(window: &TableWindow) -> Vec<Vec<String>> {
    window
        .rows
        .iter()
        .map(|row| {
            window
                .headers
                .iter()
                .map(|h| match row.get(h) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect()
}

/// Render a window in a text format. JSON callers serialize the window itself.
pub fn render_window(window: &TableWindow, format: RenderFormat) -> Result<String, ExtractionError> {
    match format {
        RenderFormat::Json => Ok(serde_json::to_string(window)?),
        RenderFormat::Csv => Ok(render_csv(window)),
        RenderFormat::Markdown => Ok(render_markdown(window)),
        RenderFormat::Html => Ok(render_html(window)),
    }
}

fn render_csv(window: &TableWindow) -> String {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let mut records = vec![window.headers.clone()];
    records.extend(cell_rows(window));
    for record in &records {
        if let Err(e) = writer.write_record(record) {
            tracing::warn!(error = %e, "Skipping unrenderable CSV row");
        }
    }
    let bytes = writer.into_inner().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn escape_markdown(cell: &str) -> String {
    cell.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace(['\n', '\r'], " ")
}

fn render_markdown(window: &TableWindow) -> String {
    let mut out = String::new();
    let headers: Vec<String> = window.headers.iter().map(|h| escape_markdown(h)).collect();
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    out.push_str(&format!(
        "|{}|\n",
        vec!["---"; window.headers.len().max(1)].join("|")
    ));
    for row in cell_rows(window) {
        let cells: Vec<String> = row.iter().map(|c| escape_markdown(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    if window.truncation.is_truncated {
        out.push_str(&format!(
            "\n_Showing {} of {} rows._\n",
            window.rows.len(),
            window.truncation.original_row_count
        ));
    }
    out
}

fn escape_html(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    for c in cell.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html(window: &TableWindow) -> String {
    let mut out = String::from("<table>\n<thead><tr>");
    for h in &window.headers {
        out.push_str(&format!("<th>{}</th>", escape_html(h)));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in cell_rows(window) {
        out.push_str("<tr>");
        for c in row {
            out.push_str(&format!("<td>{}</td>", escape_html(&c)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{keyed_row, Truncation};

    fn window(rows: &[&[&str]], truncated: bool) -> TableWindow {
        let headers = vec!["name".to_string(), "note".to_string()];
        let rows: Vec<_> = rows
            .iter()
            .map(|r| keyed_row(&headers, &r.iter().map(|s| s.to_string()).collect::<Vec<_>>()))
            .collect();
        let count = rows.len();
        TableWindow {
            table_index: 0,
            headers,
            rows,
            offset: 0,
            limit: 100,
            stored_row_count: count,
            has_more: false,
            truncation: Truncation {
                is_truncated: truncated,
                original_row_count: if truncated { count + 10 } else { count },
                applied_ceiling: 100,
            },
        }
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("CSV".parse::<RenderFormat>().unwrap(), RenderFormat::Csv);
        assert_eq!("md".parse::<RenderFormat>().unwrap(), RenderFormat::Markdown);
        assert!("xlsx".parse::<RenderFormat>().is_err());
    }

    #[test]
    fn csv_quotes_delimiters() {
        let out = render_window(&window(&[&["Smith, J", "said \"hi\""]], false), RenderFormat::Csv)
            .unwrap();
        assert_eq!(out, "name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n");
    }

    #[test]
    fn markdown_escapes_pipes_and_notes_truncation() {
        let out = render_window(&window(&[&["a|b", "line\nbreak"]], true), RenderFormat::Markdown)
            .unwrap();
        assert!(out.starts_with("| name | note |\n|---|---|\n"));
        assert!(out.contains("a\\|b"));
        assert!(out.contains("line break"));
        assert!(out.contains("Showing 1 of 11 rows"));
    }

    #[test]
    fn html_escapes_markup() {
        let out = render_window(&window(&[&["<b>x</b>", "a & b"]], false), RenderFormat::Html)
            .unwrap();
        assert!(out.contains("<td>&lt;b&gt;x&lt;/b&gt;</td>"));
        assert!(out.contains("<td>a &amp; b</td>"));
        assert!(out.contains("<th>name</th>"));
    }

    #[test]
    fn null_cells_render_empty() {
        let out = render_window(&window(&[&["only"]], false), RenderFormat::Csv).unwrap();
        assert_eq!(out, "name,note\nonly,\n");
    }

    #[test]
    fn json_carries_truncation_metadata() {
        let out = render_window(&window(&[&["a", "b"]], true), RenderFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["is_truncated"], true);
        assert_eq!(value["rows"][0]["name"], "a");
    }
}
