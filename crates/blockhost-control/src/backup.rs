//! Backup and archive tool invocations and output parsing.
//!
//! Incremental backups are delegated to `rdiff-backup`, full snapshots to
//! `tar`. This module builds their command lines and reads their results;
//! sequencing and preconditions live in the service.

use std::path::Path;

use blockhost_core::{ServerName, ServerPaths};
use blockhost_os::Invocation;
use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::types::{Archive, Increment};

static INCREMENT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w.*?) {3,}(.*?) {2,}([^ ]+ \w*)").expect("valid increment row regex")
});

/// Timestamp format embedded in archive file names.
pub const ARCHIVE_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

fn with_trailing_slash(path: &Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// Mirror the instance into its backup directory, skipping `exclude`.
#[must_use]
pub fn backup_invocation(rdiff_backup: &str, paths: &ServerPaths, exclude: &str) -> Invocation {
    Invocation::new(rdiff_backup)
        .args([
            "--exclude".to_string(),
            paths.instance_dir().join(exclude).display().to_string(),
            with_trailing_slash(paths.instance_dir()),
            paths.backup_dir().display().to_string(),
        ])
        .current_dir(paths.backup_dir())
}

/// Roll the instance back to increment `step`.
#[must_use]
pub fn restore_invocation(rdiff_backup: &str, paths: &ServerPaths, step: &str) -> Invocation {
    Invocation::new(rdiff_backup)
        .args([
            "--restore-as-of".to_string(),
            step.to_string(),
            "--force".to_string(),
            paths.backup_dir().display().to_string(),
            paths.instance_dir().display().to_string(),
        ])
        .current_dir(paths.backup_dir())
}

/// List increments with their sizes.
#[must_use]
pub fn list_invocation(rdiff_backup: &str, paths: &ServerPaths) -> Invocation {
    Invocation::new(rdiff_backup).args([
        "--list-increment-sizes".to_string(),
        paths.backup_dir().display().to_string(),
    ])
}

/// Drop increments older than `retention`.
#[must_use]
pub fn prune_invocation(rdiff_backup: &str, paths: &ServerPaths, retention: &str) -> Invocation {
    Invocation::new(rdiff_backup)
        .args([
            "--force".to_string(),
            "--remove-older-than".to_string(),
            retention.to_string(),
            paths.backup_dir().display().to_string(),
        ])
        .current_dir(paths.backup_dir())
}

/// Restore one file's revision at `step` into `dest`.
#[must_use]
pub fn previous_version_invocation(
    rdiff_backup: &str,
    paths: &ServerPaths,
    file: &str,
    step: &str,
    dest: &Path,
) -> Invocation {
    Invocation::new(rdiff_backup)
        .args([
            "--force".to_string(),
            "--restore-as-of".to_string(),
            step.to_string(),
            paths.backup_dir().join(file).display().to_string(),
            dest.display().to_string(),
        ])
        .current_dir(paths.backup_dir())
}

/// Name of an archive taken at `when`.
#[must_use]
pub fn archive_filename(server: &ServerName, when: DateTime<Local>) -> String {
    format!("server-{server}_{}.tgz", when.format(ARCHIVE_TIME_FORMAT))
}

/// Compress the instance directory into `archive_dir/filename`.
#[must_use]
pub fn archive_invocation(tar: &str, paths: &ServerPaths, filename: &str) -> Invocation {
    Invocation::new(tar)
        .args([
            "czf".to_string(),
            paths.archive_dir().join(filename).display().to_string(),
            ".".to_string(),
        ])
        .current_dir(paths.instance_dir())
}

/// Returns true if `path` names an archive that can be imported.
#[must_use]
pub fn is_importable(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    [".tar", ".tgz", ".tar.gz"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Unpack `archive` into the instance directory. Compression is detected
/// by `tar`.
#[must_use]
pub fn extract_invocation(tar: &str, paths: &ServerPaths, archive: &Path) -> Invocation {
    Invocation::new(tar)
        .args(["-xf".to_string(), archive.display().to_string()])
        .current_dir(paths.instance_dir())
}

/// Parse `--list-increment-sizes` output, oldest row first as printed.
///
/// Steps are numbered in output order and addressed as `<n>B`.
#[must_use]
pub fn parse_increments(stdout: &str) -> Vec<Increment> {
    stdout
        .lines()
        .filter_map(|line| INCREMENT_ROW.captures(line))
        .enumerate()
        .map(|(n, caps)| Increment {
            step: format!("{n}B"),
            time: caps[1].to_string(),
            size: caps[2].to_string(),
            cumulative: caps[3].to_string(),
        })
        .collect()
}

/// Every file in `dir` with its size and modification time, newest first.
///
/// A missing or unreadable directory lists as empty.
pub async fn list_archives(dir: &Path) -> Vec<Archive> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Cannot list archives");
            }
            return Vec::new();
        }
    };

    let mut archives = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Archive listing interrupted");
                break;
            }
        };
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        archives.push(Archive {
            filename: entry.file_name().to_string_lossy().into_owned(),
            time: DateTime::<Utc>::from(modified),
            size: metadata.len(),
        });
    }

    archives.sort_by(|a, b| b.time.cmp(&a.time));
    archives
}
