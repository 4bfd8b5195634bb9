//! Error types for the outlier library.
//!
//! Library code returns [`OutlierError`]; the binary and configuration loading
//! use `anyhow::Result` and attach context on top.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::operators::columns::ColumnRole;

pub type Result<T> = std::result::Result<T, OutlierError>;

#[derive(Debug, Error)]
pub enum OutlierError {
    /// One or more canonical column roles had no matching column.
    #[error("Missing required columns {missing:?}. Available: {available:?}")]
    SchemaResolution {
        missing: Vec<ColumnRole>,
        available: Vec<String>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Uploaded bytes or cell values that do not have the expected shape.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
