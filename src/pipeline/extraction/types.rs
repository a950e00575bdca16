use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::ExtractedTable;

/// Characters a fully scanned page is assumed to hold when estimating coverage.
pub const AVERAGE_PAGE_CHARS: usize = 1_500;

/// Pages with fewer meaningful characters than this are treated as scanned.
pub const MIN_PAGE_CHARS: usize = 20;

/// Native text for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

/// A region the native extractor could not read, handed to the recognition
/// engine during the slow pass. The engine receives the source bytes
/// alongside, so a region is just a locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRegion {
    /// `None` when the region is the whole file (standalone images).
    pub page_number: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// 0.0 - 1.0
    pub confidence: f32,
}

/// Output of a native (non-recognition) extraction.
#[derive(Debug, Clone, Default)]
pub struct NativeText {
    pub pages: Vec<PageText>,
    pub page_count: usize,
    /// Characters read digitally.
    pub digital_chars: usize,
    /// Digital characters plus `AVERAGE_PAGE_CHARS` per unreadable page.
    pub estimated_chars: usize,
    pub regions: Vec<ImageRegion>,
    /// Tables the format carries natively (delimited files, markup tables).
    pub tables: Vec<ExtractedTable>,
    pub warnings: Vec<String>,
}

impl NativeText {
    /// Single-page text with full coverage.
    pub fn full_coverage(text: String) -> Self {
        let chars = text.chars().count();
        Self {
            pages: vec![PageText {
                page_number: 1,
                text,
            }],
            page_count: 1,
            digital_chars: chars,
            estimated_chars: chars,
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// `digital / estimated`. Formats with nothing to read report 1.0 unless
    /// they flagged an image region.
    pub fn coverage(&self) -> f32 {
        if self.estimated_chars == 0 {
            return if self.regions.is_empty() { 1.0 } else { 0.0 };
        }
        (self.digital_chars as f32 / self.estimated_chars as f32).clamp(0.0, 1.0)
    }
}

/// Count characters that carry content, ignoring whitespace and punctuation noise.
pub fn meaningful_chars(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

/// Format-specific text extraction without recognition.
pub trait NativeExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, raw: &[u8]) -> Result<NativeText, ExtractionError>;
}

/// Layout-based table extraction from the text layer. Runs in the fast
/// pass and again in the slow pass.
pub trait TableExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract_tables(
        &self,
        raw: &[u8],
        native: &NativeText,
    ) -> Result<Vec<ExtractedTable>, ExtractionError>;
}

/// Image-to-text recognition engine.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap availability probe. Used by the health surface and before every slow pass.
    fn is_available(&self) -> bool;

    fn recognize(&self, source: &[u8], region: &ImageRegion)
        -> Result<RecognizedText, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_counts_scanned_pages() {
        let native = NativeText {
            page_count: 2,
            digital_chars: 500,
            estimated_chars: 500 + AVERAGE_PAGE_CHARS,
            regions: vec![ImageRegion {
                page_number: Some(2),
            }],
            ..NativeText::default()
        };
        assert!((native.coverage() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_text_without_regions_is_fully_covered() {
        assert_eq!(NativeText::full_coverage(String::new()).coverage(), 1.0);
    }

    #[test]
    fn region_only_has_zero_coverage() {
        let native = NativeText {
            regions: vec![ImageRegion { page_number: None }],
            ..NativeText::default()
        };
        assert_eq!(native.coverage(), 0.0);
    }

    #[test]
    fn text_joins_non_empty_pages() {
        let native = NativeText {
            pages: vec![
                PageText { page_number: 1, text: " one ".into() },
                PageText { page_number: 2, text: "  ".into() },
                PageText { page_number: 3, text: "three".into() },
            ],
            ..NativeText::default()
        };
        assert_eq!(native.text(), "one\n\nthree");
    }

    #[test]
    fn meaningful_ignores_noise() {
        assert_eq!(meaningful_chars("  ..--\n\t 12 ab "), 4);
    }
}
