//! Filesystem-backed `Store` implementation.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::DocumentCache;
use crate::document::PropertyDocument;
use crate::error::{Result, StoreError};
use crate::Store;

/// Store that reads and writes documents in place, caching parses by `mtime`.
///
/// Writes rewrite the existing file rather than replacing it, so ownership
/// and permissions set at creation time survive edits.
#[derive(Debug, Default)]
pub struct FileStore {
    cache: DocumentCache,
}

impl FileStore {
    /// Create a store with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &DocumentCache {
        &self.cache
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load(&self, path: &Path) -> Result<PropertyDocument> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.cache.invalidate(path);
                return Ok(PropertyDocument::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let modified = metadata.modified().map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(document) = self.cache.get(path, modified) {
            return Ok((*document).clone());
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let document = PropertyDocument::parse(&text);
        debug!(path = %path.display(), "Parsed property document");

        self.cache
            .insert(path.to_path_buf(), modified, Arc::new(document.clone()));
        Ok(document)
    }

    async fn save(&self, path: &Path, document: &PropertyDocument) -> Result<()> {
        self.cache.invalidate(path);
        tokio::fs::write(path, document.to_string())
            .await
            .map_err(|source| StoreError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "Wrote property document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (FileStore, TempDir) {
        (FileStore::new(), TempDir::new().unwrap())
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let (store, dir) = setup();
        let doc = store.load(&dir.path().join("server.config")).await.unwrap();
        assert!(doc.is_empty());
        assert!(!dir.path().join("server.config").exists());
    }

    #[tokio::test]
    async fn modify_preserves_other_keys() {
        let (store, dir) = setup();
        let path = dir.path().join("server.config");
        std::fs::write(&path, "[java]\njava_xmx=256\njarfile=server.jar\n\n[onreboot]\nstart=false\n")
            .unwrap();

        store.modify(&path, "java", "java_xms", "128").await.unwrap();

        let doc = store.load(&path).await.unwrap();
        assert_eq!(doc.get("java", "java_xms"), Some("128"));
        assert_eq!(doc.get("java", "java_xmx"), Some("256"));
        assert_eq!(doc.get("java", "jarfile"), Some("server.jar"));
        assert_eq!(doc.get("onreboot", "start"), Some("false"));
    }

    #[tokio::test]
    async fn modify_creates_section() {
        let (store, dir) = setup();
        let path = dir.path().join("server.config");

        store.modify(&path, "minecraft", "profile", "vanilla").await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[minecraft]\nprofile=vanilla\n");
    }

    #[tokio::test]
    async fn overlay_sets_many_keys() {
        let (store, dir) = setup();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "motd=hello\n").unwrap();

        store
            .overlay(&path, "", &[("server-port", "25570"), ("max-players", "5")])
            .await
            .unwrap();

        let doc = store.load(&path).await.unwrap();
        assert_eq!(doc.get_root("motd"), Some("hello"));
        assert_eq!(doc.get_root("server-port"), Some("25570"));
        assert_eq!(doc.get_root("max-players"), Some("5"));
    }

    #[tokio::test]
    async fn modified_values_read_back_from_disk() {
        let (store, dir) = setup();
        let path = dir.path().join("server.properties");

        for value in ["\"Welcome\"", "  padded  ", "line1\nenable-query=true", ""] {
            store.modify(&path, "", "motd", value).await.unwrap();

            let doc = FileStore::new().load(&path).await.unwrap();
            assert_eq!(doc.get_root("motd"), Some(value));
            assert_eq!(doc.get_root("enable-query"), None);
        }
    }

    #[tokio::test]
    async fn cache_entry_dropped_on_write() {
        let (store, dir) = setup();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "server-port=1\n").unwrap();

        store.load(&path).await.unwrap();
        assert!(store.cache().contains(&path));

        store.modify(&path, "", "server-port", "2").await.unwrap();
        assert!(!store.cache().contains(&path));

        let doc = store.load(&path).await.unwrap();
        assert_eq!(doc.get_root("server-port"), Some("2"));
    }

    #[tokio::test]
    async fn external_edit_with_new_mtime_is_seen() {
        let (store, dir) = setup();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "server-port=1\n").unwrap();
        assert_eq!(store.load(&path).await.unwrap().get_root("server-port"), Some("1"));

        std::fs::write(&path, "server-port=3\n").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        file.set_modified(later).unwrap();

        assert_eq!(store.load(&path).await.unwrap().get_root("server-port"), Some("3"));
    }

    #[tokio::test]
    async fn remove_section_rewrites() {
        let (store, dir) = setup();
        let path = dir.path().join("cron.config");
        std::fs::write(&path, "[abc]\nsource=* * * * *\n\n[def]\nsource=0 * * * *\n").unwrap();

        assert!(store.remove_section(&path, "abc").await.unwrap());
        let doc = store.load(&path).await.unwrap();
        assert!(doc.section("abc").is_none());
        assert_eq!(doc.get("def", "source"), Some("0 * * * *"));
    }
}
