//! Property document storage for blockhost.
//!
//! Every instance carries three sectioned `key=value` documents next to its
//! files: `server.properties` (read by the engine itself), `server.config`
//! (launch configuration) and `cron.config` (scheduled commands). This crate
//! reads and writes them.
//!
//! # Caching
//!
//! Parsed documents are cached per path, tagged with the file's modification
//! time. A read whose `mtime` differs from the cached tag re-parses the file;
//! every write replaces the whole file and drops the cache entry.
//!
//! # Example
//!
//! ```no_run
//! use blockhost_store::{FileStore, Store};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::new();
//! let path = Path::new("/var/games/minecraft/servers/alpha/server.config");
//!
//! store.modify(path, "java", "java_xmx", "1024").await?;
//! let config = store.load(path).await?;
//! assert_eq!(config.get("java", "java_xmx"), Some("1024"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod document;
pub mod error;
pub mod file;

pub use cache::DocumentCache;
pub use document::{parse_leading_int, PropertyDocument, ROOT_SECTION};
pub use error::{Result, StoreError};
pub use file::FileStore;

use std::path::Path;

use async_trait::async_trait;

/// The storage trait for property documents.
///
/// Implementations only need `load` and `save`; the editing operations are
/// built on top of them and always write back the fully merged document.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the document at `path`.
    ///
    /// A missing file yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    async fn load(&self, path: &Path) -> Result<PropertyDocument>;

    /// Replace the document at `path` with `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    async fn save(&self, path: &Path, document: &PropertyDocument) -> Result<()>;

    /// Set one key and write the whole document back.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    async fn modify(
        &self,
        path: &Path,
        section: &str,
        key: &str,
        value: &str,
    ) -> Result<PropertyDocument> {
        let mut document = self.load(path).await?;
        document.set(section, key, value);
        self.save(path, &document).await?;
        Ok(document)
    }

    /// Set many keys of one section and write the whole document back.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    async fn overlay(
        &self,
        path: &Path,
        section: &str,
        entries: &[(&str, &str)],
    ) -> Result<PropertyDocument> {
        let mut document = self.load(path).await?;
        for (key, value) in entries {
            document.set(section, key, value);
        }
        self.save(path, &document).await?;
        Ok(document)
    }

    /// Remove a whole section and write the document back.
    ///
    /// Returns `true` if the section existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    async fn remove_section(&self, path: &Path, section: &str) -> Result<bool> {
        let mut document = self.load(path).await?;
        let removed = document.remove_section(section);
        self.save(path, &document).await?;
        Ok(removed)
    }
}
