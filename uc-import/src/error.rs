//! Import error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Errors that reject a whole import file
///
/// Problems confined to a single CSV row are reported as
/// [`RowError`](crate::types::RowError)s instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes exceeds maximum {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Too many rows: {rows} exceeds maximum {limit} races per import")]
    TooManyRows { rows: usize, limit: usize },

    #[error("Invalid GPX: {0}")]
    InvalidGpx(String),

    #[error("Invalid CSV: {0}")]
    InvalidCsv(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}
