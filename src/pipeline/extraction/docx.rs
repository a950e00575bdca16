//! Word (DOCX) extraction from `word/document.xml`.
//!
//! Paragraph text and `w:tbl` tables come out in document order. A table
//! nested inside a cell contributes its text to that cell.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::types::{NativeExtractor, NativeText};
use super::ExtractionError;
use crate::models::{ExtractedTable, TableSource};

const DOCUMENT_PART: &str = "word/document.xml";

/// Decompressed size cap for the document part.
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

/// Paragraphs per printed page when estimating page count.
const PARAGRAPHS_PER_PAGE: usize = 25;

pub struct DocxExtractor;

impl NativeExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError> {
        let xml = read_document_part(raw)?;
        let body = parse_body(&xml)?;

        let mut native = NativeText::full_coverage(body.blocks.join("\n"));
        native.page_count = (body.paragraphs / PARAGRAPHS_PER_PAGE).max(1);
        for grid in body.tables {
            if let Some(table) = table_from_grid(grid) {
                native.tables.push(table);
            }
        }
        Ok(native)
    }
}

/// Whether a ZIP archive carries a Word document part.
pub fn is_word_package(raw: &[u8]) -> bool {
    zip::ZipArchive::new(std::io::Cursor::new(raw))
        .map(|archive| archive.file_names().any(|name| name == DOCUMENT_PART))
        .unwrap_or(false)
}

fn read_document_part(raw: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(raw))
        .map_err(|e| ExtractionError::DocxParsing(e.to_string()))?;
    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractionError::DocxParsing(format!("{DOCUMENT_PART}: {e}")))?;

    let mut xml = Vec::new();
    part.take(MAX_PART_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractionError::DocxParsing(e.to_string()))?;
    if xml.len() as u64 >= MAX_PART_BYTES {
        return Err(ExtractionError::DocxParsing(format!(
            "{DOCUMENT_PART} exceeds {MAX_PART_BYTES} bytes"
        )));
    }
    Ok(xml)
}

#[derive(Debug, Default)]
struct DocxBody {
    /// Paragraph text and rendered tables, in document order.
    blocks: Vec<String>,
    paragraphs: usize,
    tables: Vec<Vec<Vec<String>>>,
}

#[derive(Debug, Default)]
struct BodyReader {
    body: DocxBody,
    paragraph: String,
    table_depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    in_text: bool,
}

impl BodyReader {
    fn push_text(&mut self, text: &str) {
        if self.table_depth > 0 {
            self.cell.push_str(text);
        } else {
            self.paragraph.push_str(text);
        }
    }

    fn open(&mut self, local: &[u8]) {
        match local {
            b"tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.rows.clear();
                }
            }
            b"tr" if self.table_depth == 1 => self.row.clear(),
            b"tc" if self.table_depth == 1 => self.cell.clear(),
            b"t" => self.in_text = true,
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8]) {
        match local {
            b"tbl" => {
                if self.table_depth == 1 {
                    let grid = std::mem::take(&mut self.rows);
                    if !grid.is_empty() {
                        self.body.blocks.push(
                            grid.iter()
                                .map(|row| row.join("\t"))
                                .collect::<Vec<_>>()
                                .join("\n"),
                        );
                        self.body.tables.push(grid);
                    }
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            b"tr" if self.table_depth == 1 => {
                let row = std::mem::take(&mut self.row);
                self.rows.push(row);
            }
            b"tc" if self.table_depth == 1 => {
                let cell = std::mem::take(&mut self.cell);
                self.row.push(cell.split_whitespace().collect::<Vec<_>>().join(" "));
            }
            b"t" => self.in_text = false,
            b"p" if self.table_depth > 0 => self.cell.push(' '),
            b"p" => {
                self.body.paragraphs += 1;
                let text = std::mem::take(&mut self.paragraph);
                let text = text.trim();
                if !text.is_empty() {
                    self.body.blocks.push(text.to_string());
                }
            }
            _ => {}
        }
    }

    /// Self-closing run content.
    fn empty(&mut self, local: &[u8]) {
        match local {
            b"tab" => self.push_text("\t"),
            b"br" | b"cr" => self.push_text("\n"),
            _ => {}
        }
    }
}

fn parse_body(xml: &[u8]) -> Result<DocxBody, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut state = BodyReader::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(e.local_name().as_ref()),
            Ok(Event::End(e)) => state.close(e.local_name().as_ref()),
            Ok(Event::Empty(e)) => state.empty(e.local_name().as_ref()),
            Ok(Event::Text(text)) if state.in_text => {
                let text = text
                    .unescape()
                    .map_err(|e| ExtractionError::DocxParsing(e.to_string()))?;
                state.push_text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::DocxParsing(format!(
                    "{DOCUMENT_PART} at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(state.body)
}

/// First row is the header row; data rows are padded or cut to its width.
/// A grid with no data rows is not a table.
fn table_from_grid(grid: Vec<Vec<String>>) -> Option<ExtractedTable> {
    let mut rows = grid.into_iter().filter(|row| row.iter().any(|c| !c.is_empty()));
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
