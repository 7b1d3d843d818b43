//! Lifecycle, console and backup control for blockhost game servers.
//!
//! This crate implements the controller that manages independently spawned
//! engine processes:
//!
//! - **Lifecycle**: create, start, stop, kill, restart and delete, gated by
//!   the state observed from disk and the process table
//! - **Launch**: the runnable asset in `server.config` resolved to a
//!   [`LaunchKind`] with its own bounds and argument rule
//! - **Console**: commands typed into the `screen` session, and log-confirmed
//!   world saves
//! - **Backups**: incremental backups and full archives through external tools
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ControlService                 │
//! │  ┌──────────┐  ┌──────────┐  ┌────────────┐  │
//! │  │ lifecycle│  │  launch  │  │   backup   │  │
//! │  └──────────┘  └──────────┘  └────────────┘  │
//! └──────┬────────────────┬────────────────┬─────┘
//!        │                │                │
//!   ┌────▼────┐     ┌─────▼─────┐    ┌─────▼─────┐
//!   │  Store  │     │   Host    │    │   probe   │
//!   └─────────┘     └───────────┘    └───────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use blockhost_control::{ControlConfig, ControlService, ServerControl};
//! use blockhost_os::SystemHost;
//! use blockhost_store::FileStore;
//!
//! let service = ControlService::new(
//!     Arc::new(SystemHost::new()?),
//!     Arc::new(FileStore::new()),
//!     ControlConfig::default(),
//! );
//! service.start(&name).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod backup;
pub mod console;
pub mod error;
pub mod launch;
pub mod lifecycle;
pub mod logwatch;
pub mod profile;
pub mod service;
pub mod types;

pub use error::{ControlError, Precondition, Result};
pub use launch::LaunchKind;
pub use lifecycle::{Operation, ServerState};
pub use service::{ControlService, ServerControl};
pub use types::{Archive, ControlConfig, Dependency, Increment, ToolNames, DEFAULT_BASE_DIR};
