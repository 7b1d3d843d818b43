//! The real host: process table, child processes and signals.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{Gid, Pid, Uid};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::{Invocation, ToolOutput};
use crate::error::{HostError, Result};
use crate::procfs::{ProcFs, ProcessMap};
use crate::Host;

/// Host backed by the running operating system.
#[derive(Debug, Clone)]
pub struct SystemHost {
    procfs: ProcFs,
}

impl SystemHost {
    /// Probe for the process table and build a host on it.
    ///
    /// # Errors
    ///
    /// Returns an error if no process table is mounted.
    pub fn new() -> Result<Self> {
        let procfs = ProcFs::detect()?;
        debug!(root = %procfs.root().display(), "Using process table");
        Ok(Self { procfs })
    }

    /// Build a host on an explicit process table.
    #[must_use]
    pub const fn with_procfs(procfs: ProcFs) -> Self {
        Self { procfs }
    }

    /// The process table in use.
    #[must_use]
    pub const fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.get_args()).stdin(Stdio::null());
        if let Some(cwd) = invocation.cwd() {
            cmd.current_dir(cwd);
        }
        if let Some(creds) = invocation.get_credentials() {
            // Leave ids alone when they already match ours.
            if creds.gid != Gid::effective().as_raw() {
                cmd.gid(creds.gid);
            }
            if creds.uid != Uid::effective().as_raw() {
                cmd.uid(creds.uid);
            }
        }
        cmd
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn scan(&self) -> Result<ProcessMap> {
        self.procfs.scan().await
    }

    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(command = %invocation, "Running tool");
        let output = Self::command(invocation)
            .output()
            .await
            .map_err(|source| HostError::Spawn {
                program: invocation.program().to_string(),
                source,
            })?;

        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.success() {
            debug!(command = %invocation, code = ?result.code, "Tool exited unsuccessfully");
        }
        Ok(result)
    }

    async fn launch(&self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(command = %invocation, "Launching detached");
        let status = Self::command(invocation)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| HostError::Spawn {
                program: invocation.program().to_string(),
                source,
            })?;
        Ok(ToolOutput {
            code: status.code(),
            ..ToolOutput::default()
        })
    }

    async fn kill(&self, pid: i32) -> Result<()> {
        kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(|source| {
            warn!(pid, error = %source, "Failed to deliver SIGKILL");
            HostError::Signal { pid, source }
        })
    }

    async fn process_status(&self, pid: i32) -> Result<Option<BTreeMap<String, String>>> {
        self.procfs.status(pid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> SystemHost {
        SystemHost::with_procfs(ProcFs::at("/proc"))
    }

    #[tokio::test]
    async fn run_captures_output() {
        let out = host()
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn run_in_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = host()
            .run(&Invocation::new("pwd").current_dir(dir.path()))
            .await
            .unwrap();
        assert!(out.success());
        let reported = std::path::PathBuf::from(out.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = host()
            .run(&Invocation::new("blockhost-definitely-not-installed"))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Spawn { .. }));
    }

    #[tokio::test]
    async fn launch_reports_exit_code() {
        let out = host()
            .launch(&Invocation::new("sh").args(["-c", "exit 0"]))
            .await
            .unwrap();
        assert!(out.success());
    }
}
