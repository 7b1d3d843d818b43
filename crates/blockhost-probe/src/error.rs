//! Error types for the probe crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while probing a server.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The reply matched none of the known shapes.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The exchange did not finish in time.
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io(_))
    }
}

/// A specialized Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
