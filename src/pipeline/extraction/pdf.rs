use super::table_detect::detect_tables;
use super::types::{
    meaningful_chars, ImageRegion, NativeExtractor, NativeText, PageText, TableExtractor,
    AVERAGE_PAGE_CHARS, MIN_PAGE_CHARS,
};
use super::ExtractionError;
use crate::models::{ExtractedTable, TableSource};

/// PDF text extractor using the pdf-extract crate.
/// Pages without a usable text layer become image regions for the slow pass.
pub struct PdfTextExtractor;

impl NativeExtractor for PdfTextExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(raw)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let mut native = NativeText {
            page_count: page_texts.len(),
            ..NativeText::default()
        };

        for (i, text) in page_texts.into_iter().enumerate() {
            let page_number = i + 1;
            let chars = meaningful_chars(&text);
            if chars < MIN_PAGE_CHARS {
                native.estimated_chars += AVERAGE_PAGE_CHARS;
                native.regions.push(ImageRegion {
                    page_number: Some(page_number),
                });
            } else {
                native.digital_chars += chars;
                native.estimated_chars += chars;
            }
            native.pages.push(PageText { page_number, text });
        }

        tracing::debug!(
            pages = native.page_count,
            scanned_pages = native.regions.len(),
            coverage = native.coverage(),
            "PDF text layer read"
        );
        Ok(native)
    }
}

/// Aligned-column tables found in the PDF text layer.
pub struct PdfLayoutTables;

impl TableExtractor for PdfLayoutTables {
    fn name(&self) -> &'static str {
        "pdf-layout"
    }

    fn extract_tables(
        &self,
        _raw: &[u8],
        native: &NativeText,
    ) -> Result<Vec<ExtractedTable>, ExtractionError> {
        let mut tables = Vec::new();
        for page in &native.pages {
            for mut table in detect_tables(&page.text, TableSource::NativeLayout) {
                table.page_number = Some(page.page_number);
                tables.push(table);
            }
        }
        Ok(tables)
    }
}
