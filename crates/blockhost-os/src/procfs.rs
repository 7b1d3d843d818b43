//! Process table discovery.
//!
//! A server is running exactly when some process on the host is tagged with
//! its name. Two tags exist:
//!
//! - the console session's command line, `screen ... -S mc-<name>`
//! - the engine's environment, which inherits `STY=<pid>.mc-<name>` from the
//!   session it was started in
//!
//! Nothing here is memoized: every [`ProcFs::scan`] reads the table afresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{HostError, Result};

/// Roots probed in order; the first with an `uptime` entry wins.
pub const PROC_ROOTS: [&str; 4] = [
    "/usr/compat/linux/proc",
    "/system/lxproc",
    "/proc",
    "/compat/linux/proc",
];

static CONSOLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)screen[^S]+S mc-([^\s]+)").expect("valid console regex"));

static ENGINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.mc-([^\s]+)").expect("valid engine regex"));

/// The processes found for one server name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    /// Pid of the console session.
    pub console: Option<i32>,
    /// Pid of the engine running inside the session.
    pub engine: Option<i32>,
}

/// Server name → processes, as of one scan.
pub type ProcessMap = BTreeMap<String, ProcessRecord>;

/// What a single process-table entry turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// A console session for the named server.
    Console(String),
    /// An engine for the named server.
    Engine(String),
}

/// Classify one process from its NUL-separated command line and environment.
///
/// The environment is consulted only when the command line is not a console
/// session, and is read lazily through `environ`.
pub fn classify<F>(cmdline: &str, environ: F) -> Option<Tag>
where
    F: FnOnce() -> Option<String>,
{
    let cmdline = cmdline.replace('\0', " ");
    if let Some(caps) = CONSOLE_PATTERN.captures(&cmdline) {
        return Some(Tag::Console(caps[1].to_string()));
    }

    let environ = environ()?.replace('\0', " ");
    ENGINE_PATTERN
        .captures(&environ)
        .map(|caps| Tag::Engine(caps[1].to_string()))
}

/// Fold one classified pid into a process map.
pub fn record(map: &mut ProcessMap, pid: i32, tag: Tag) {
    match tag {
        Tag::Console(name) => map.entry(name).or_default().console = Some(pid),
        Tag::Engine(name) => map.entry(name).or_default().engine = Some(pid),
    }
}

/// A mounted process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Probe the known roots and use the first one that is mounted.
    ///
    /// # Errors
    ///
    /// Returns `HostError::ProcRootNotFound` if none of them is.
    pub fn detect() -> Result<Self> {
        let candidates: Vec<&Path> = PROC_ROOTS.iter().map(Path::new).collect();
        Self::detect_in(&candidates)
            .ok_or_else(|| HostError::ProcRootNotFound(PROC_ROOTS.join(", ")))
    }

    /// Use the first of `candidates` holding an `uptime` entry.
    #[must_use]
    pub fn detect_in(candidates: &[&Path]) -> Option<Self> {
        candidates
            .iter()
            .find(|root| root.join("uptime").exists())
            .map(|root| Self::at(*root))
    }

    /// Use a specific root without probing.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The process-table root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the whole table and map tagged processes to server names.
    ///
    /// Entries that disappear or become unreadable mid-scan are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the root itself cannot be listed.
    pub async fn scan(&self) -> Result<ProcessMap> {
        let mut map = ProcessMap::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };

            let dir = entry.path();
            let cmdline = match tokio::fs::read(dir.join("cmdline")).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    trace!(pid, error = %e, "Skipping unreadable process entry");
                    continue;
                }
            };

            let environ = if CONSOLE_PATTERN.is_match(&cmdline.replace('\0', " ")) {
                None
            } else {
                match tokio::fs::read(dir.join("environ")).await {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        trace!(pid, error = %e, "Skipping unreadable process environment");
                        None
                    }
                }
            };

            if let Some(tag) = classify(&cmdline, || environ) {
                record(&mut map, pid, tag);
            }
        }

        debug!(servers = map.len(), "Scanned process table");
        Ok(map)
    }

    /// Read `<root>/<pid>/status` as `Key → value` pairs.
    ///
    /// Returns `None` if the process no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn status(&self, pid: i32) -> Result<Option<BTreeMap<String, String>>> {
        let path = self.root.join(pid.to_string()).join("status");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(parse_status(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse the `Key:\tvalue` lines of a process status file.
#[must_use]
pub fn parse_status(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
