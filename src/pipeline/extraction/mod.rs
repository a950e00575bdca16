pub mod classify;
pub mod docx;
pub mod html;
pub mod image;
pub mod pdf;
pub mod plain_text;
pub mod recognition;
pub mod registry;
pub mod render;
pub mod sanitize;
pub mod table_detect;
pub mod tabular;
pub mod types;

pub use classify::*;
pub use recognition::*;
pub use registry::*;
pub use render::*;
pub use sanitize::*;
pub use types::*;

use thiserror::Error;

use crate::models::{DocumentFormat, ErrorKind};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("DOCX parsing failed: {0}")]
    DocxParsing(String),

    #[error("No extractor registered for format {0}")]
    UnsupportedFormat(DocumentFormat),

    #[error("Recognition engine unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Tabular input could not be parsed: {0}")]
    MalformedTabularInput(String),

    #[error("Unknown table format: {0}")]
    UnknownRenderFormat(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::UnsupportedFormat(_)
            | ExtractionError::UnknownRenderFormat(_)
            | ExtractionError::PdfParsing(_)
            | ExtractionError::DocxParsing(_) => ErrorKind::UnsupportedFormat,
            ExtractionError::RecognitionUnavailable(_) => ErrorKind::RecognitionEngineUnavailable,
            ExtractionError::MalformedTabularInput(_) => ErrorKind::MalformedTabularInput,
            ExtractionError::Recognition(_) | ExtractionError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}
