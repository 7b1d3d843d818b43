//! Error types for the storage layer.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading a document failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The document path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a document failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The document path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
