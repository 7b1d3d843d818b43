//! Error types for server control.
//!
//! Every error that concerns one instance carries its name. Precondition
//! failures are raised before any side effect.

use std::time::Duration;

use blockhost_core::ServerName;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// The named reason an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    /// The instance already exists.
    #[error("server already exists")]
    AlreadyExists,
    /// The instance does not exist.
    #[error("server does not exist")]
    NotFound,
    /// The instance is running.
    #[error("server is already running")]
    AlreadyRunning,
    /// The instance is not running.
    #[error("server is not running")]
    NotRunning,
    /// The console session is up but no engine process was found in it.
    #[error("no engine process found")]
    EngineNotFound,
    /// `enable-query` is not set in server.properties.
    #[error("query is not enabled")]
    QueryDisabled,
    /// The engine does not speak the requested protocol.
    #[error("engine does not support this operation")]
    UnsupportedEngine,
}

/// Errors that can occur in server control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The operation is not allowed in the current state.
    #[error("{server}: {violation}")]
    Precondition {
        /// The server concerned.
        server: ServerName,
        /// Why the operation was refused.
        violation: Precondition,
    },

    /// Launch configuration is missing or invalid.
    #[error("{server}: configuration error: {reason}")]
    Configuration {
        /// The server concerned.
        server: ServerName,
        /// What is wrong.
        reason: String,
    },

    /// An argument supplied by the caller was rejected.
    #[error("{server}: invalid argument: {reason}")]
    InvalidArgument {
        /// The server concerned.
        server: ServerName,
        /// What is wrong.
        reason: String,
    },

    /// An external tool exited unsuccessfully.
    #[error("{server}: {tool} failed with {}", describe_exit(.code))]
    ExternalTool {
        /// The server concerned.
        server: ServerName,
        /// The tool that failed.
        tool: String,
        /// Its exit code, or `None` if it was killed by a signal.
        code: Option<i32>,
        /// What it wrote to standard error.
        stderr: String,
    },

    /// The server was still up when the poll bound ran out.
    #[error("{server}: still running after {waited:?}")]
    StuckProcess {
        /// The server concerned.
        server: ServerName,
        /// How long was waited.
        waited: Duration,
    },

    /// The engine did not confirm a world save in time.
    #[error("{server}: world save not confirmed within {waited:?}")]
    SaveNotConfirmed {
        /// The server concerned.
        server: ServerName,
        /// How long was waited.
        waited: Duration,
    },

    /// Status probe failed.
    #[error("probe error: {0}")]
    Probe(#[from] blockhost_probe::ProbeError),

    /// Property document storage failed.
    #[error("storage error: {0}")]
    Store(#[from] blockhost_store::StoreError),

    /// Host interaction failed.
    #[error("host error: {0}")]
    Host(#[from] blockhost_os::HostError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"))
}

impl ControlError {
    /// Shorthand for a precondition failure.
    #[must_use]
    pub fn precondition(server: &ServerName, violation: Precondition) -> Self {
        Self::Precondition {
            server: server.clone(),
            violation,
        }
    }

    /// Shorthand for a configuration error.
    #[must_use]
    pub fn configuration(server: &ServerName, reason: impl Into<String>) -> Self {
        Self::Configuration {
            server: server.clone(),
            reason: reason.into(),
        }
    }

    /// The precondition that was violated, if this is a precondition error.
    #[must_use]
    pub const fn violation(&self) -> Option<Precondition> {
        match self {
            Self::Precondition { violation, .. } => Some(*violation),
            _ => None,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::StuckProcess { .. } | Self::SaveNotConfirmed { .. } | Self::Io(_) => true,
            Self::Probe(e) => e.is_retriable(),
            Self::Host(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Process exit code a command-line front end should report.
    ///
    /// External tool failures pass the tool's own exit code through.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Precondition { .. } => 2,
            Self::Configuration { .. } | Self::InvalidArgument { .. } => 3,
            Self::Probe(blockhost_probe::ProbeError::ProtocolMismatch(_)) => 4,
            Self::ExternalTool { code, .. } => code.filter(|c| *c != 0).unwrap_or(5),
            Self::StuckProcess { .. } | Self::SaveNotConfirmed { .. } => 6,
            Self::Probe(_) | Self::Store(_) | Self::Host(_) | Self::Io(_) => 1,
        }
    }
}
