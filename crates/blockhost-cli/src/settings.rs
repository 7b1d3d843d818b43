//! Control configuration from files and flags.
//!
//! Precedence, lowest first: built-in defaults, the first configuration file
//! found (or the one given with `--config`), then `--base-dir` /
//! `BLOCKHOST_BASE_DIR`.

use std::path::{Path, PathBuf};

use blockhost_control::ControlConfig;
use blockhost_store::PropertyDocument;
use thiserror::Error;

/// Configuration files probed when none is given.
pub const CONFIG_PATHS: [&str; 2] = ["/etc/blockhost.conf", "/usr/local/etc/blockhost.conf"];

/// Key naming the base directory.
pub const BASE_DIRECTORY_KEY: &str = "base_directory";

const TOOLS_SECTION: &str = "tools";

/// Errors reading the configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The base directory is too short to be a real path.
    #[error("base_directory must be at least 2 characters, got {0:?}")]
    BaseDirTooShort(String),
}

fn checked_base_dir(value: &str) -> Result<PathBuf, SettingsError> {
    if value.chars().count() < 2 {
        return Err(SettingsError::BaseDirTooShort(value.to_string()));
    }
    Ok(PathBuf::from(value))
}

/// Apply one configuration document on top of `config`.
///
/// # Errors
///
/// Returns `SettingsError::BaseDirTooShort` for an unusable base directory.
pub fn apply_document(
    config: &mut ControlConfig,
    document: &PropertyDocument,
) -> Result<(), SettingsError> {
    if let Some(base) = document.get_root(BASE_DIRECTORY_KEY) {
        config.base_dir = checked_base_dir(base.trim())?;
    }

    let tools = &mut config.tools;
    for (key, slot) in [
        ("screen", &mut tools.screen),
        ("tar", &mut tools.tar),
        ("rsync", &mut tools.rsync),
        ("rdiff_backup", &mut tools.rdiff_backup),
        ("java", &mut tools.java),
    ] {
        if let Some(program) = document.get_non_empty(TOOLS_SECTION, key) {
            *slot = program.to_string();
        }
    }
    Ok(())
}

async fn read_document(path: &Path) -> Result<Option<PropertyDocument>, SettingsError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(PropertyDocument::parse(&text))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SettingsError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Build the control configuration.
///
/// An explicit `config_file` must exist; the default locations are skipped
/// when absent.
///
/// # Errors
///
/// Returns an error if a configuration file cannot be read or names an
/// unusable base directory.
pub async fn load(
    config_file: Option<&Path>,
    base_dir: Option<&Path>,
) -> Result<ControlConfig, SettingsError> {
    let mut config = ControlConfig::default();

    if let Some(path) = config_file {
        let document = read_document(path).await?.ok_or_else(|| SettingsError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        apply_document(&mut config, &document)?;
    } else {
        for candidate in CONFIG_PATHS {
            if let Some(document) = read_document(Path::new(candidate)).await? {
                tracing::debug!(path = %candidate, "Loaded configuration");
                apply_document(&mut config, &document)?;
                break;
            }
        }
    }

    if let Some(base) = base_dir {
        config.base_dir = checked_base_dir(&base.to_string_lossy())?;
    }

    Ok(config)
}
