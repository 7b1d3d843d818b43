//! Operating-system plumbing for blockhost.
//!
//! This crate provides the [`Host`] trait, the single seam between the
//! lifecycle controller and the machine it runs on:
//!
//! - **Process table**: [`ProcFs`] scans `cmdline`/`environ` of every process
//!   and maps tagged ones to server names
//! - **External tools**: [`Invocation`] describes a program call with its
//!   working directory and the credentials it runs under
//! - **Signals**: `SIGKILL` delivery for stuck engines
//! - **Ownership**: [`Owner`] resolves and assigns the user owning an instance
//!
//! # Testing
//!
//! For testing without real sessions, enable the `test-utils` feature and use
//! the mock host:
//!
//! ```ignore
//! use blockhost_os::{Host, Invocation, MockHost};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = MockHost::new();
//! host.launch(&Invocation::new("screen").args(["-dmS", "mc-alpha", "java"])).await?;
//! assert!(host.scan().await?.contains_key("alpha"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod command;
pub mod error;
pub mod owner;
pub mod procfs;
pub mod system;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use command::{locate, Credentials, Invocation, ToolOutput};
pub use error::{HostError, Result};
pub use owner::Owner;
pub use procfs::{ProcFs, ProcessMap, ProcessRecord};
pub use system::SystemHost;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockHost;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Everything the controller needs from the machine.
#[async_trait]
pub trait Host: Send + Sync {
    /// Read the process table afresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be listed.
    async fn scan(&self) -> Result<ProcessMap>;

    /// Run a program to completion, capturing its output.
    ///
    /// A non-zero exit is not an error here; inspect [`ToolOutput::code`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Run a program that daemonizes itself, discarding its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    async fn launch(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Send `SIGKILL` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    async fn kill(&self, pid: i32) -> Result<()>;

    /// Read the kernel's status fields for `pid`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the status exists but cannot be read.
    async fn process_status(&self, pid: i32) -> Result<Option<BTreeMap<String, String>>>;
}
