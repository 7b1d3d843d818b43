//! Profile delta and sync.
//!
//! A profile is a directory under `profiles/` whose contents are copied into
//! an instance before start. Only changed files are copied; the dry-run
//! listing decides whether a copy is needed at all.

use std::path::Path;

use blockhost_os::{Invocation, Owner};
use once_cell::sync::Lazy;
use regex::Regex;

/// rsync exit code for "some files vanished or could not be transferred".
pub const PARTIAL_TRANSFER: i32 = 23;

static SENT_BYTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sent \d+ bytes").expect("valid rsync summary regex"));

fn with_trailing_slash(path: &Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// Dry-run listing of files that differ between `profile` and `instance`.
#[must_use]
pub fn delta_invocation(rsync: &str, profile: &Path, instance: &Path) -> Invocation {
    Invocation::new(rsync).args([
        "-vrun".to_string(),
        with_trailing_slash(profile),
        with_trailing_slash(instance),
    ])
}

/// Copy `profile` into `instance`, owned by `owner`, group-writable.
#[must_use]
pub fn sync_invocation(rsync: &str, profile: &Path, instance: &Path, owner: &Owner) -> Invocation {
    Invocation::new(rsync).args([
        "-au".to_string(),
        format!("--chown={}", owner.chown_spec()),
        "--chmod=ug=rwX".to_string(),
        with_trailing_slash(profile),
        with_trailing_slash(instance),
    ])
}

/// Returns true if a delta run exited acceptably.
#[must_use]
pub fn delta_succeeded(code: Option<i32>) -> bool {
    matches!(code, Some(0 | PARTIAL_TRANSFER))
}

/// Extract changed paths from the verbose dry-run output.
///
/// The header line, the trailing totals line, the transfer summary and
/// blank lines are dropped.
#[must_use]
pub fn parse_delta(stdout: &str) -> Vec<String> {
    let mut lines: Vec<&str> = stdout.lines().collect();
    if !lines.is_empty() {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.pop();

    lines
        .into_iter()
        .filter(|l| !l.trim().is_empty() && !SENT_BYTES.is_match(l))
        .map(str::to_string)
        .collect()
}
