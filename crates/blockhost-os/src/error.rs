//! Error types for the host crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the operating system.
#[derive(Error, Debug)]
pub enum HostError {
    /// None of the known process-table roots is mounted.
    #[error("No process table found (tried {0})")]
    ProcRootNotFound(String),

    /// An external program could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A signal could not be delivered.
    #[error("Failed to signal pid {pid}: {source}")]
    Signal {
        /// The target process.
        pid: i32,
        /// The errno reported by the kernel.
        source: nix::Error,
    },

    /// Changing file ownership failed.
    #[error("Failed to chown {path}: {source}")]
    Chown {
        /// The file whose owner was being set.
        path: PathBuf,
        /// The errno reported by the kernel.
        source: nix::Error,
    },

    /// A user name did not resolve.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// A group name did not resolve.
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Io(_))
    }
}

/// A specialized Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
