//! External tool invocations.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// The uid/gid a child process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// Numeric user id.
    pub uid: u32,
    /// Numeric group id.
    pub gid: u32,
}

/// A fully described external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    credentials: Option<Credentials>,
}

impl Invocation {
    /// Start describing a call to `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            credentials: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Run as the given user and group.
    #[must_use]
    pub const fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The program's file name, without any leading directories.
    #[must_use]
    pub fn program_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }

    /// The argument list.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// The credentials, if set.
    #[must_use]
    pub const fn get_credentials(&self) -> Option<Credentials> {
        self.credentials
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished external program left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl ToolOutput {
    /// A successful run with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the program exited with code zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Resolve a program on `PATH`.
#[must_use]
pub fn locate(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_display() {
        let inv = Invocation::new("/usr/bin/rdiff-backup")
            .args(["--list-increment-sizes", "/srv/backup/alpha"])
            .current_dir("/srv")
            .credentials(Credentials { uid: 1000, gid: 100 });

        assert_eq!(inv.program_name(), "rdiff-backup");
        assert_eq!(inv.get_args().len(), 2);
        assert_eq!(inv.cwd(), Some(Path::new("/srv")));
        assert_eq!(
            inv.get_credentials(),
            Some(Credentials { uid: 1000, gid: 100 })
        );
        assert_eq!(
            inv.to_string(),
            "/usr/bin/rdiff-backup --list-increment-sizes /srv/backup/alpha"
        );
    }

    #[test]
    fn output_success() {
        assert!(ToolOutput::ok("").success());
        assert!(!ToolOutput::failed(23, "missing").success());
        assert!(!ToolOutput::default().success());
    }

    #[test]
    fn locate_missing_program() {
        assert!(locate("blockhost-definitely-not-installed").is_none());
    }
}
