//! In-memory host for tests.
//!
//! `MockHost` understands just enough of `screen` to behave like a host with
//! real sessions: `screen -dmS mc-<name> ...` starts a server and a `stop`
//! typed into its console ends it. Every invocation is recorded. Other tools
//! succeed silently unless a response was scripted for them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use blockhost_core::SESSION_PREFIX;

use crate::command::{Invocation, ToolOutput};
use crate::error::{HostError, Result};
use crate::procfs::{ProcessMap, ProcessRecord};
use crate::Host;

/// A line appended to a file whenever a console command is received.
struct LogEcho {
    command: String,
    path: PathBuf,
    line: String,
}

struct MockState {
    processes: ProcessMap,
    next_pid: i32,
    invocations: Vec<Invocation>,
    scripted: HashMap<String, VecDeque<ToolOutput>>,
    stubborn: HashSet<String>,
    echoes: Vec<LogEcho>,
    statuses: HashMap<i32, BTreeMap<String, String>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            processes: ProcessMap::new(),
            next_pid: 1000,
            invocations: Vec::new(),
            scripted: HashMap::new(),
            stubborn: HashSet::new(),
            echoes: Vec::new(),
            statuses: HashMap::new(),
        }
    }
}

impl MockState {
    fn spawn_server(&mut self, name: &str) -> ProcessRecord {
        let record = ProcessRecord {
            console: Some(self.next_pid),
            engine: Some(self.next_pid + 1),
        };
        self.next_pid += 2;
        self.processes.insert(name.to_string(), record);
        record
    }

    fn console_input(&mut self, name: &str, command: &str) {
        for echo in self.echoes.iter().filter(|e| e.command == command) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&echo.path)
            {
                let _ = writeln!(file, "{}", echo.line);
            }
        }

        if command == "stop" && !self.stubborn.contains(name) {
            self.processes.remove(name);
        }
    }

    fn simulate_screen(&mut self, args: &[String]) {
        let session_after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .and_then(|s| s.strip_prefix(SESSION_PREFIX))
                .map(str::to_string)
        };

        if let Some(name) = session_after("-dmS") {
            self.spawn_server(&name);
            return;
        }

        let Some(name) = session_after("-S") else {
            return;
        };
        if !self.processes.contains_key(&name) {
            return;
        }
        if let Some(command) = args
            .last()
            .and_then(|a| a.strip_prefix("stuff \""))
            .and_then(|a| a.strip_suffix("\\012\""))
        {
            self.console_input(&name, command);
        }
    }

    fn handle(&mut self, invocation: &Invocation) -> ToolOutput {
        self.invocations.push(invocation.clone());
        let program = invocation.program_name().to_string();

        if program == "screen" {
            self.simulate_screen(invocation.get_args());
        }

        self.scripted
            .get_mut(&program)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ToolOutput::ok(""))
    }
}

/// A host that keeps its process table in memory.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    /// Create a mock host with no running servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a server as already running.
    pub fn insert_running(&self, name: &str) -> ProcessRecord {
        self.state.lock().spawn_server(name)
    }

    /// Make `stop` typed into this server's console have no effect.
    pub fn ignore_stop(&self, name: &str) {
        self.state.lock().stubborn.insert(name.to_string());
    }

    /// Queue the output of the next call to `program` (matched by file name).
    pub fn script(&self, program: &str, output: ToolOutput) {
        self.state
            .lock()
            .scripted
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Append `line` to `path` every time `command` is typed into a console.
    pub fn echo_to_log(&self, command: &str, path: impl Into<PathBuf>, line: &str) {
        self.state.lock().echoes.push(LogEcho {
            command: command.to_string(),
            path: path.into(),
            line: line.to_string(),
        });
    }

    /// Set the status fields reported for `pid`.
    pub fn set_status(&self, pid: i32, status: BTreeMap<String, String>) {
        self.state.lock().statuses.insert(pid, status);
    }

    /// Every invocation so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Invocations of one program (matched by file name).
    #[must_use]
    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|i| i.program_name() == program)
            .cloned()
            .collect()
    }

    /// Get the number of running servers.
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.state.lock().processes.len()
    }
}

#[async_trait]
impl Host for MockHost {
    async fn scan(&self) -> Result<ProcessMap> {
        Ok(self.state.lock().processes.clone())
    }

    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        Ok(self.state.lock().handle(invocation))
    }

    async fn launch(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let mut output = self.state.lock().handle(invocation);
        output.stdout.clear();
        output.stderr.clear();
        Ok(output)
    }

    async fn kill(&self, pid: i32) -> Result<()> {
        let mut state = self.state.lock();
        let name = state
            .processes
            .iter()
            .find(|(_, r)| r.engine == Some(pid) || r.console == Some(pid))
            .map(|(name, _)| name.clone())
            .ok_or(HostError::Signal {
                pid,
                source: nix::errno::Errno::ESRCH,
            })?;
        state.processes.remove(&name);
        Ok(())
    }

    async fn process_status(&self, pid: i32) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.state.lock().statuses.get(&pid).cloned())
    }
}
