pub mod format;
pub mod hash;

pub use format::*;
pub use hash::*;

use thiserror::Error;

use crate::models::ErrorKind;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Empty upload")]
    Empty,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::UnsupportedFormat(_)
            | ImportError::FileTooLarge { .. }
            | ImportError::Empty => ErrorKind::UnsupportedFormat,
        }
    }
}
