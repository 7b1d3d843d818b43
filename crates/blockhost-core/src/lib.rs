//! Core types and utilities for blockhost.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: the validated [`ServerName`] every operation is keyed by
//! - **Paths**: the fixed directory layout an instance resolves to
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use blockhost_core::{ServerName, ServerPaths};
//!
//! let name = ServerName::parse("alpha").unwrap();
//! assert_eq!(name.session_name(), "mc-alpha");
//!
//! let paths = ServerPaths::new("/var/games/minecraft", &name);
//! assert!(paths.instance_dir().ends_with("servers/alpha"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{CoreError, Result};
pub use ids::{NameError, ServerName, SESSION_PREFIX};
pub use paths::{BaseLayout, ServerPaths};
