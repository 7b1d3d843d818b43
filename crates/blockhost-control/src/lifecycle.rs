//! Server lifecycle state machine.
//!
//! State is never stored. It is observed on demand from two facts: whether
//! `server.properties` exists, and whether the process table currently holds
//! a process tagged with the server's name.
//!
//! # State Machine
//!
//! ```text
//!             create               start
//!   Absent ──────────▶ Stopped ───────────▶ Starting
//!     ▲                 │  ▲  ▲                │
//!     └───── delete ────┘  │  │                ▼
//!                          │  └── Stopping ◀── Running
//!                          └───── Killing  ◀─────┘
//! ```
//!
//! `Starting`, `Stopping` and `Killing` are transient: they exist only inside
//! one operation and are never observed.

use std::fmt;

use blockhost_core::ServerName;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ControlError, Precondition, Result};

/// The observable state of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No instance on disk.
    Absent,
    /// Instance on disk, nothing running.
    Stopped,
    /// Console session being spawned.
    Starting,
    /// Tagged process present.
    Running,
    /// Waiting for the engine to exit after `stop`.
    Stopping,
    /// Waiting for the engine to exit after `SIGKILL`.
    Killing,
}

impl ServerState {
    /// Derive the stable state from the two observed facts.
    ///
    /// A tagged process counts as running even without an instance on disk.
    #[must_use]
    pub const fn observe(exists: bool, running: bool) -> Self {
        match (exists, running) {
            (_, true) => Self::Running,
            (true, false) => Self::Stopped,
            (false, false) => Self::Absent,
        }
    }

    /// Returns true for states only seen inside an operation.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping | Self::Killing)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Killing => "killing",
        };
        f.write_str(s)
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: ServerState, to: ServerState) -> bool {
    use ServerState::{Absent, Killing, Running, Starting, Stopped, Stopping};

    matches!(
        (from, to),
        (Absent, Stopped)
            | (Stopped, Absent | Starting)
            | (Starting, Running)
            | (Running, Stopping | Killing)
            | (Stopping | Killing, Stopped)
    )
}

/// Record that an operation moved `server` from `from` to `to`.
///
/// Returns `to`. A move the state machine does not allow is logged, not refused.
pub fn transition(server: &ServerName, from: ServerState, to: ServerState) -> ServerState {
    if is_valid_transition(from, to) {
        debug!(server = %server, %from, %to, "State transition");
    } else {
        warn!(server = %server, %from, %to, "Unexpected state transition");
    }
    to
}

/// An operation that is gated on the observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create the instance.
    Create,
    /// Remove the instance and its backups.
    Delete,
    /// Spawn the console session.
    Start,
    /// Ask the engine to exit.
    Stop,
    /// Kill the engine.
    Kill,
    /// Type into the console.
    Console,
    /// Talk to the engine over the network.
    Probe,
    /// Roll the instance back to an increment.
    Restore,
    /// Snapshot the instance (incremental or archive).
    Snapshot,
    /// Read or edit instance configuration.
    Inspect,
}

/// Validate that `operation` may run on a server with the observed facts.
///
/// # Errors
///
/// Returns `ControlError::Precondition` naming the first violated condition.
pub fn require(
    server: &ServerName,
    operation: Operation,
    exists: bool,
    running: bool,
) -> Result<()> {
    let violation = match operation {
        Operation::Create if exists => Some(Precondition::AlreadyExists),
        Operation::Create if running => Some(Precondition::AlreadyRunning),
        Operation::Create => None,
        _ if !exists => Some(Precondition::NotFound),
        Operation::Delete | Operation::Start | Operation::Restore if running => {
            Some(Precondition::AlreadyRunning)
        }
        Operation::Stop | Operation::Kill | Operation::Console | Operation::Probe
            if !running =>
        {
            Some(Precondition::NotRunning)
        }
        _ => None,
    };

    violation.map_or(Ok(()), |v| Err(ControlError::precondition(server, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha() -> ServerName {
        ServerName::parse("alpha").unwrap()
    }

    #[test]
    fn observed_states() {
        assert_eq!(ServerState::observe(false, false), ServerState::Absent);
        assert_eq!(ServerState::observe(true, false), ServerState::Stopped);
        assert_eq!(ServerState::observe(true, true), ServerState::Running);
        assert_eq!(ServerState::observe(false, true), ServerState::Running);
        assert!(!ServerState::observe(true, true).is_transient());
    }

    #[test]
    fn valid_transitions() {
        use ServerState::*;

        assert!(is_valid_transition(Absent, Stopped));
        assert!(is_valid_transition(Stopped, Starting));
        assert!(is_valid_transition(Starting, Running));
        assert!(is_valid_transition(Running, Stopping));
        assert!(is_valid_transition(Running, Killing));
        assert!(is_valid_transition(Stopping, Stopped));
        assert!(is_valid_transition(Killing, Stopped));
        assert!(is_valid_transition(Stopped, Absent));
    }

    #[test]
    fn invalid_transitions() {
        use ServerState::*;

        assert!(!is_valid_transition(Absent, Running));
        assert!(!is_valid_transition(Running, Absent));
        assert!(!is_valid_transition(Stopped, Running));
        assert!(!is_valid_transition(Running, Starting));
    }

    #[test]
    fn transition_yields_target() {
        let name = alpha();
        let pending = transition(&name, ServerState::Running, ServerState::Stopping);
        assert!(pending.is_transient());
        assert_eq!(
            transition(&name, pending, ServerState::Stopped),
            ServerState::Stopped
        );
        assert_eq!(
            transition(&name, ServerState::Absent, ServerState::Running),
            ServerState::Running
        );
    }

    #[test]
    fn create_preconditions() {
        let name = alpha();
        assert!(require(&name, Operation::Create, false, false).is_ok());
        assert_eq!(
            require(&name, Operation::Create, true, false)
                .unwrap_err()
                .violation(),
            Some(Precondition::AlreadyExists)
        );
        assert_eq!(
            require(&name, Operation::Create, false, true)
                .unwrap_err()
                .violation(),
            Some(Precondition::AlreadyRunning)
        );
    }

    #[test]
    fn running_preconditions() {
        let name = alpha();
        assert!(require(&name, Operation::Stop, true, true).is_ok());
        assert!(require(&name, Operation::Console, true, true).is_ok());
        assert_eq!(
            require(&name, Operation::Probe, true, false)
                .unwrap_err()
                .violation(),
            Some(Precondition::NotRunning)
        );
        assert_eq!(
            require(&name, Operation::Kill, true, false)
                .unwrap_err()
                .violation(),
            Some(Precondition::NotRunning)
        );
        assert_eq!(
            require(&name, Operation::Kill, false, false)
                .unwrap_err()
                .violation(),
            Some(Precondition::NotFound)
        );
    }

    #[test]
    fn stopped_preconditions() {
        let name = alpha();
        assert!(require(&name, Operation::Start, true, false).is_ok());
        assert!(require(&name, Operation::Delete, true, false).is_ok());
        assert_eq!(
            require(&name, Operation::Restore, true, true)
                .unwrap_err()
                .violation(),
            Some(Precondition::AlreadyRunning)
        );
        assert!(require(&name, Operation::Snapshot, true, true).is_ok());
        assert_eq!(
            require(&name, Operation::Snapshot, false, false)
                .unwrap_err()
                .violation(),
            Some(Precondition::NotFound)
        );
    }
}
