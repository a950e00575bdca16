pub mod extraction;
pub mod import;
pub mod limiter;
pub mod processor;
pub mod storage;

use thiserror::Error;

use crate::models::ErrorKind;
use extraction::ExtractionError;
use import::ImportError;
use storage::StorageError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Import(e) => e.kind(),
            PipelineError::Extraction(e) => e.kind(),
            PipelineError::Storage(e) => e.kind(),
        }
    }
}
