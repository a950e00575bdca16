pub mod compress;
pub mod content_store;

pub use content_store::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::ErrorKind;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Stored content for {document_id} is corrupted: {reason}")]
    Corruption { document_id: String, reason: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Table {index} not found for document {document_id}")]
    TableNotFound { document_id: String, index: usize },

    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(DatabaseError::Sqlite(err))
    }
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Corruption { .. } => ErrorKind::StorageCorruption,
            StorageError::DocumentNotFound(_) | StorageError::TableNotFound { .. } => {
                ErrorKind::NotFound
            }
            StorageError::Database(_)
            | StorageError::Compression(_)
            | StorageError::Serialization(_) => ErrorKind::Internal,
        }
    }
}
