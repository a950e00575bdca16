use std::collections::HashMap;
use std::sync::Arc;

use super::docx::DocxExtractor;
use super::html::HtmlExtractor;
use super::image::ImageExtractor;
use super::pdf::{PdfLayoutTables, PdfTextExtractor};
use super::plain_text::PlainTextExtractor;
use super::tabular::DelimitedExtractor;
use super::types::{NativeExtractor, RecognitionEngine, TableExtractor};
use super::ExtractionError;
use crate::models::DocumentFormat;

/// Everything the pipeline needs for one format, resolved once per document.
#[derive(Clone)]
pub struct Collaborators {
    pub format: DocumentFormat,
    pub native: Arc<dyn NativeExtractor>,
    pub tables: Option<Arc<dyn TableExtractor>>,
    /// Whether documents of this format can contain regions for recognition.
    pub has_image_regions: bool,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("format", &self.format)
            .field("native", &self.native.name())
            .field("tables", &self.tables.as_ref().map(|t| t.name()))
            .field("has_image_regions", &self.has_image_regions)
            .finish()
    }
}

/// Format → collaborator table plus the shared recognition engine.
pub struct CollaboratorRegistry {
    by_format: HashMap<DocumentFormat, Collaborators>,
    recognition: Arc<dyn RecognitionEngine>,
}

impl CollaboratorRegistry {
    pub fn empty(recognition: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            by_format: HashMap::new(),
            recognition,
        }
    }

    /// Reference collaborators for every supported format.
    pub fn with_defaults(recognition: Arc<dyn RecognitionEngine>) -> Self {
        let text: Arc<dyn NativeExtractor> = Arc::new(PlainTextExtractor);
        let mut registry = Self::empty(recognition);
        registry
            .register(
                DocumentFormat::Pdf,
                Arc::new(PdfTextExtractor),
                Some(Arc::new(PdfLayoutTables)),
                true,
            )
            .register(
                DocumentFormat::Csv,
                Arc::new(DelimitedExtractor::new(DocumentFormat::Csv)),
                None,
                false,
            )
            .register(
                DocumentFormat::Tsv,
                Arc::new(DelimitedExtractor::new(DocumentFormat::Tsv)),
                None,
                false,
            )
            .register(DocumentFormat::PlainText, Arc::clone(&text), None, false)
            .register(DocumentFormat::Json, Arc::clone(&text), None, false)
            .register(DocumentFormat::Xml, text, None, false)
            .register(DocumentFormat::Html, Arc::new(HtmlExtractor), None, false)
            .register(DocumentFormat::Docx, Arc::new(DocxExtractor), None, false)
            .register(DocumentFormat::Image, Arc::new(ImageExtractor), None, true);
        registry
    }

    pub fn register(
        &mut self,
        format: DocumentFormat,
        native: Arc<dyn NativeExtractor>,
        tables: Option<Arc<dyn TableExtractor>>,
        has_image_regions: bool,
    ) -> &mut Self {
        self.by_format.insert(
            format,
            Collaborators {
                format,
                native,
                tables,
                has_image_regions,
            },
        );
        self
    }

    pub fn resolve(&self, format: DocumentFormat) -> Result<Collaborators, ExtractionError> {
        self.by_format
            .get(&format)
            .cloned()
            .ok_or(ExtractionError::UnsupportedFormat(format))
    }

    pub fn recognition(&self) -> &Arc<dyn RecognitionEngine> {
        &self.recognition
    }
}
