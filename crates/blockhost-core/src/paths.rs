//! Directory layout.
//!
//! Everything lives under one base directory:
//!
//! ```text
//! <base>/servers/<name>/     instance directory (server.properties, server.config, cron.config)
//! <base>/backup/<name>/      incremental backup destination
//! <base>/archive/<name>/     full compressed snapshots
//! <base>/profiles/           shared read-only content profiles
//! <base>/import/             archives waiting to be imported
//! ```

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::ids::ServerName;

/// Directory holding instance directories.
pub const SERVERS_DIR: &str = "servers";
/// Directory holding incremental backup destinations.
pub const BACKUP_DIR: &str = "backup";
/// Directory holding compressed archives.
pub const ARCHIVE_DIR: &str = "archive";
/// Directory holding shared profiles.
pub const PROFILES_DIR: &str = "profiles";
/// Directory holding importable archives.
pub const IMPORT_DIR: &str = "import";

/// File name of the engine's own property document.
pub const SERVER_PROPERTIES: &str = "server.properties";
/// File name of the launch configuration document.
pub const SERVER_CONFIG: &str = "server.config";
/// File name of the scheduled-command document.
pub const CRON_CONFIG: &str = "cron.config";

/// The base directory and its fixed top-level subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseLayout {
    base: PathBuf,
}

impl BaseLayout {
    /// Create a layout rooted at `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory itself.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>/servers`.
    #[must_use]
    pub fn servers(&self) -> PathBuf {
        self.base.join(SERVERS_DIR)
    }

    /// `<base>/backup`.
    #[must_use]
    pub fn backups(&self) -> PathBuf {
        self.base.join(BACKUP_DIR)
    }

    /// `<base>/archive`.
    #[must_use]
    pub fn archives(&self) -> PathBuf {
        self.base.join(ARCHIVE_DIR)
    }

    /// `<base>/profiles`.
    #[must_use]
    pub fn profiles(&self) -> PathBuf {
        self.base.join(PROFILES_DIR)
    }

    /// `<base>/import`.
    #[must_use]
    pub fn imports(&self) -> PathBuf {
        self.base.join(IMPORT_DIR)
    }

    /// All top-level directories, in creation order.
    #[must_use]
    pub fn all_dirs(&self) -> [PathBuf; 5] {
        [
            self.servers(),
            self.backups(),
            self.archives(),
            self.imports(),
            self.profiles(),
        ]
    }

    /// Resolve the directory set of one server.
    #[must_use]
    pub fn server(&self, name: &ServerName) -> ServerPaths {
        ServerPaths::new(&self.base, name)
    }

    /// Extract the server name from a path inside `<base>/servers`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoNameInPath` if the path is not under the servers
    /// directory, or `CoreError::InvalidName` if the component is not a valid name.
    pub fn server_name_from_path(&self, path: &Path) -> Result<ServerName> {
        let rest = path
            .strip_prefix(self.servers())
            .map_err(|_| CoreError::NoNameInPath(path.display().to_string()))?;
        let first = rest
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .ok_or_else(|| CoreError::NoNameInPath(path.display().to_string()))?;
        Ok(ServerName::parse(first)?)
    }
}

/// The fixed directory set one server name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPaths {
    instance: PathBuf,
    backup: PathBuf,
    archive: PathBuf,
    profiles: PathBuf,
    imports: PathBuf,
}

impl ServerPaths {
    /// Resolve the directories for `name` under `base`.
    #[must_use]
    pub fn new(base: impl AsRef<Path>, name: &ServerName) -> Self {
        let base = base.as_ref();
        Self {
            instance: base.join(SERVERS_DIR).join(name.as_str()),
            backup: base.join(BACKUP_DIR).join(name.as_str()),
            archive: base.join(ARCHIVE_DIR).join(name.as_str()),
            profiles: base.join(PROFILES_DIR),
            imports: base.join(IMPORT_DIR),
        }
    }

    /// Working directory of the engine.
    #[must_use]
    pub fn instance_dir(&self) -> &Path {
        &self.instance
    }

    /// Incremental backup destination.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup
    }

    /// Archive directory.
    #[must_use]
    pub fn archive_dir(&self) -> &Path {
        &self.archive
    }

    /// Shared profile pool.
    #[must_use]
    pub fn profile_pool(&self) -> &Path {
        &self.profiles
    }

    /// Import directory for relative archive paths.
    #[must_use]
    pub fn import_dir(&self) -> &Path {
        &self.imports
    }

    /// `server.properties` inside the instance directory.
    #[must_use]
    pub fn server_properties(&self) -> PathBuf {
        self.instance.join(SERVER_PROPERTIES)
    }

    /// `server.config` inside the instance directory.
    #[must_use]
    pub fn server_config(&self) -> PathBuf {
        self.instance.join(SERVER_CONFIG)
    }

    /// `cron.config` inside the instance directory.
    #[must_use]
    pub fn cron_config(&self) -> PathBuf {
        self.instance.join(CRON_CONFIG)
    }

    /// The engine's live log.
    #[must_use]
    pub fn latest_log(&self) -> PathBuf {
        self.instance.join("logs").join("latest.log")
    }

    /// `eula.txt` inside the instance directory.
    #[must_use]
    pub fn eula(&self) -> PathBuf {
        self.instance.join("eula.txt")
    }

    /// Directory of a named profile.
    #[must_use]
    pub fn profile(&self, profile: &str) -> PathBuf {
        self.profiles.join(profile)
    }
}
