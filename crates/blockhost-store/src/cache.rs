//! Modification-time tagged document cache.
//!
//! One entry per document path. An entry is only served while the file's
//! current `mtime` equals the tag it was stored with.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::document::PropertyDocument;

#[derive(Debug)]
struct CachedDocument {
    modified: SystemTime,
    document: Arc<PropertyDocument>,
}

/// A cache of parsed documents keyed by path.
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: RwLock<HashMap<PathBuf, CachedDocument>>,
}

impl DocumentCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached document for `path` if it was stored with `modified`.
    #[must_use]
    pub fn get(&self, path: &Path, modified: SystemTime) -> Option<Arc<PropertyDocument>> {
        self.entries
            .read()
            .get(path)
            .filter(|entry| entry.modified == modified)
            .map(|entry| Arc::clone(&entry.document))
    }

    /// Insert or replace the entry for `path`.
    pub fn insert(&self, path: PathBuf, modified: SystemTime, document: Arc<PropertyDocument>) {
        self.entries
            .write()
            .insert(path, CachedDocument { modified, document });
    }

    /// Drop the entry for `path`. Returns `true` if one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.write().remove(path).is_some()
    }

    /// Check if `path` has an entry, regardless of its tag.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    /// Get the number of cached documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
