use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DocumentFormat, ProcessingMethod};
use super::table::Table;

/// Metadata row for a stored document. Never carries the compressed blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Hex SHA-256 of the raw bytes.
    pub document_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub preview: String,
    pub word_count: usize,
    pub page_count: usize,
    pub char_count: usize,
    pub table_count: usize,
    pub processing_method: ProcessingMethod,
    pub recognition_used: bool,
    pub needs_enhancement: bool,
    pub enhancement_task_id: Option<String>,
    pub text_coverage: f32,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSummary {
    /// True once no enhancement is pending for this content.
    pub fn is_finalized(&self) -> bool {
        !self.needs_enhancement
    }
}

/// A fully materialized document: metadata, decompressed text and stored tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub full_text: String,
    pub tables: Vec<Table>,
}

/// Content produced by the fast pass and written by `ContentStore::put`.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub filename: String,
    pub format: DocumentFormat,
    pub text: String,
    pub page_count: usize,
    pub text_coverage: f32,
    pub needs_enhancement: bool,
    pub tables: Vec<Table>,
}

/// Slow-pass results merged into an existing document by `ContentStore::update`.
#[derive(Debug, Clone)]
pub struct EnhancedFields {
    pub text: String,
    pub page_count: usize,
    pub processing_method: ProcessingMethod,
    pub recognition_used: bool,
    pub tables: Vec<Table>,
}

/// Counts used for previews and listings.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters, cut on a char boundary.
pub fn preview_of(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
