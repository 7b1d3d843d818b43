//! Configuration and result types for control operations.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default base directory holding `servers/`, `backup/`, `archive/`, ...
pub const DEFAULT_BASE_DIR: &str = "/var/games/minecraft";

/// `server.properties` entries written when an instance is created.
pub const SERVER_PROPERTIES_DEFAULTS: [(&str, &str); 12] = [
    ("server-port", "25565"),
    ("max-players", "20"),
    ("level-seed", ""),
    ("gamemode", "0"),
    ("difficulty", "1"),
    ("level-type", "DEFAULT"),
    ("level-name", "world"),
    ("max-build-height", "256"),
    ("generate-structures", "true"),
    ("generator-settings", ""),
    ("server-ip", "0.0.0.0"),
    ("enable-query", "false"),
];

/// Port the engine listens on when `server-port` is unset.
pub const DEFAULT_SERVER_PORT: u16 = 25565;

/// Names (or paths) of the external programs the controller drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolNames {
    /// Console multiplexer.
    pub screen: String,
    /// Archiver.
    pub tar: String,
    /// Profile synchronizer.
    pub rsync: String,
    /// Incremental backup tool.
    pub rdiff_backup: String,
    /// Java launcher used when `java.java_binary` is unset.
    pub java: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            screen: "screen".to_string(),
            tar: "tar".to_string(),
            rsync: "rsync".to_string(),
            rdiff_backup: "rdiff-backup".to_string(),
            java: "java".to_string(),
        }
    }
}

impl ToolNames {
    /// Every tool as `(role, program)`.
    #[must_use]
    pub fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("screen", &self.screen),
            ("tar", &self.tar),
            ("rsync", &self.rsync),
            ("rdiff-backup", &self.rdiff_backup),
            ("java", &self.java),
        ]
    }
}

/// Configuration for the control service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Base directory of the whole installation.
    pub base_dir: PathBuf,
    /// Sleep between liveness polls during stop/kill.
    pub poll_interval: Duration,
    /// Liveness polls before a stop/kill is declared stuck.
    pub max_poll_iterations: u32,
    /// Pause after spawning the console session.
    pub settle_delay: Duration,
    /// Bound on a ping or query exchange.
    pub probe_timeout: Duration,
    /// How long the autosave probe watches the log.
    pub autosave_probe_window: Duration,
    /// How long to wait for a world save to be confirmed.
    pub save_commit_window: Duration,
    /// Default wait after `save-all` when the caller gives none.
    pub saveall_delay: Duration,
    /// Directory (relative to the instance) left out of incremental backups.
    pub backup_exclude: String,
    /// External programs.
    pub tools: ToolNames,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            poll_interval: Duration::from_millis(200),
            max_poll_iterations: 150,
            settle_delay: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(2500),
            autosave_probe_window: Duration::from_secs(2),
            save_commit_window: Duration::from_secs(10),
            saveall_delay: Duration::from_secs(5),
            backup_exclude: "dynmap".to_string(),
            tools: ToolNames::default(),
        }
    }
}

impl ControlConfig {
    /// Default configuration rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Longest a stop or kill will wait for the server to disappear.
    #[must_use]
    pub fn stop_bound(&self) -> Duration {
        self.poll_interval * self.max_poll_iterations
    }
}

/// One row of the incremental backup listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Increment {
    /// Restore address of this increment (`0B`, `1B`, ...).
    pub step: String,
    /// Timestamp as printed by the backup tool.
    pub time: String,
    /// Size of this increment.
    pub size: String,
    /// Cumulative size up to this increment.
    pub cumulative: String,
}

/// One file in the archive directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    /// File name within the archive directory.
    pub filename: String,
    /// Last modification time.
    pub time: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

/// Where an external program resolves on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    /// What the program is used for.
    pub role: String,
    /// The configured program name.
    pub program: String,
    /// Resolved path, if found.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("/var/games/minecraft"));
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.max_poll_iterations, 150);
        assert_eq!(config.stop_bound(), Duration::from_secs(30));
        assert_eq!(config.tools.rdiff_backup, "rdiff-backup");
    }

    #[test]
    fn with_base_dir_keeps_other_defaults() {
        let config = ControlConfig::with_base_dir("/srv/mc");
        assert_eq!(config.base_dir, PathBuf::from("/srv/mc"));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn increment_serializes() {
        let inc = Increment {
            step: "0B".into(),
            time: "Sat Jan  4 12:00:00 2020".into(),
            size: "1.23 MB".into(),
            cumulative: "1.23 MB".into(),
        };
        let json = serde_json::to_value(&inc).unwrap();
        assert_eq!(json["step"], "0B");
    }
}
