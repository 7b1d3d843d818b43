//! Common error types for blockhost.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the blockhost system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid server name was provided.
    #[error("invalid server name: {0}")]
    InvalidName(#[from] crate::ids::NameError),

    /// A path did not lie under the servers directory.
    #[error("no server name in path: {0}")]
    NoNameInPath(String),
}
