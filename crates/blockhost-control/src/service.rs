//! Server control service implementation.
//!
//! This module provides the `ServerControl` trait and `ControlService`
//! implementation that composes the property store, the host and the status
//! probes into lifecycle, console and backup operations.
//!
//! Nothing about a server's liveness is remembered between calls: every
//! precondition is checked against a fresh process scan.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blockhost_core::{BaseLayout, ServerName, ServerPaths};
use blockhost_os::{locate, Host, Invocation, Owner, ProcessRecord, ToolOutput};
use blockhost_probe::{FullStat, PingResult};
use blockhost_store::{PropertyDocument, Store, ROOT_SECTION};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::backup;
use crate::console::{self, commands};
use crate::error::{ControlError, Precondition, Result};
use crate::launch::{self, LaunchKind};
use crate::lifecycle::{self, Operation, ServerState};
use crate::logwatch::{LogWatch, AUTOSAVE_ALREADY_ON, AUTOSAVE_TURNED_ON, WORLD_SAVED};
use crate::profile;
use crate::types::{
    Archive, ControlConfig, Dependency, Increment, DEFAULT_SERVER_PORT,
    SERVER_PROPERTIES_DEFAULTS,
};

static EULA_ACCEPTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)eula\s*=\s*true").expect("valid eula regex"));

/// Trait defining the server control operations.
///
/// This trait provides the complete API for managing game-server instances on
/// one host. Every operation is scoped to a single server.
#[async_trait]
pub trait ServerControl: Send + Sync {
    // =========================================================================
    // Discovery
    // =========================================================================

    /// Names of every instance directory.
    async fn list_servers(&self) -> Result<Vec<ServerName>>;

    /// Names of every server with a tagged process.
    async fn servers_up(&self) -> Result<Vec<ServerName>>;

    /// Returns true if the instance has a `server.properties`.
    async fn exists(&self, name: &ServerName) -> Result<bool>;

    /// Returns true if a tagged process exists for `name`.
    async fn is_running(&self, name: &ServerName) -> Result<bool>;

    /// The observed lifecycle state.
    async fn state(&self, name: &ServerName) -> Result<ServerState>;

    /// Console and engine pids, if running.
    async fn process(&self, name: &ServerName) -> Result<Option<ProcessRecord>>;

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the instance directories and seed its documents.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Precondition` if the server exists or is running.
    async fn create(&self, name: &ServerName, owner: &Owner) -> Result<()>;

    /// Create an instance that only marks itself unconventional.
    async fn create_unconventional(&self, name: &ServerName, owner: &Owner) -> Result<()>;

    /// Create an instance and unpack a tar archive into it.
    ///
    /// Relative archive paths resolve under the import directory.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidArgument` for an unsupported archive type.
    async fn create_from_archive(
        &self,
        name: &ServerName,
        owner: &Owner,
        archive: &Path,
    ) -> Result<()>;

    /// Remove the instance, backup and archive directories.
    async fn delete(&self, name: &ServerName) -> Result<()>;

    /// Spawn the console session running the engine.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Configuration` if launch settings are invalid;
    /// nothing is spawned in that case.
    async fn start(&self, name: &ServerName) -> Result<()>;

    /// Ask the engine to exit and wait for it to disappear.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StuckProcess` if it is still up after the poll
    /// bound.
    async fn stop(&self, name: &ServerName) -> Result<()>;

    /// Kill the engine and wait for it to disappear.
    async fn kill(&self, name: &ServerName) -> Result<()>;

    /// Stop, then start.
    async fn restart(&self, name: &ServerName) -> Result<()>;

    /// Stop, then take an incremental backup.
    async fn stop_and_backup(&self, name: &ServerName) -> Result<()>;

    /// The arguments `start` would pass to the console multiplexer.
    async fn launch_args(&self, name: &ServerName) -> Result<Vec<String>>;

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The instance's `server.properties`.
    async fn properties(&self, name: &ServerName) -> Result<PropertyDocument>;

    /// The instance's `server.config`.
    async fn server_config(&self, name: &ServerName) -> Result<PropertyDocument>;

    /// Set one `server.properties` key.
    async fn modify_properties(
        &self,
        name: &ServerName,
        key: &str,
        value: &str,
    ) -> Result<PropertyDocument>;

    /// Set many `server.properties` keys in one write.
    async fn overlay_properties(
        &self,
        name: &ServerName,
        entries: &[(&str, &str)],
    ) -> Result<PropertyDocument>;

    /// Set one `server.config` key.
    async fn modify_config(
        &self,
        name: &ServerName,
        section: &str,
        key: &str,
        value: &str,
    ) -> Result<PropertyDocument>;

    /// Whether the server should be started at boot.
    async fn onreboot_start(&self, name: &ServerName) -> Result<bool>;

    /// Whether the server is flagged unconventional.
    async fn unconventional(&self, name: &ServerName) -> Result<bool>;

    /// Positive `minecraft.commit_interval`, if set.
    async fn commit_interval(&self, name: &ServerName) -> Result<Option<i64>>;

    // =========================================================================
    // Cron Documents
    // =========================================================================

    /// The instance's `cron.config`.
    async fn crons(&self, name: &ServerName) -> Result<PropertyDocument>;

    /// Store a cron definition, disabled.
    async fn add_cron(
        &self,
        name: &ServerName,
        id: &str,
        definition: &[(&str, &str)],
    ) -> Result<()>;

    /// Remove a cron definition. Returns true if it existed.
    async fn delete_cron(&self, name: &ServerName, id: &str) -> Result<bool>;

    /// Enable or disable a cron definition.
    async fn set_cron(&self, name: &ServerName, id: &str, enabled: bool) -> Result<()>;

    // =========================================================================
    // Instance Information
    // =========================================================================

    /// The user and group owning the instance directory.
    async fn owner(&self, name: &ServerName) -> Result<Owner>;

    /// Whether the EULA is accepted, or `None` if `eula.txt` is absent.
    async fn eula(&self, name: &ServerName) -> Result<Option<bool>>;

    /// Write an accepted `eula.txt`.
    async fn accept_eula(&self, name: &ServerName) -> Result<()>;

    /// Runnable assets in the instance and its active profile.
    async fn server_files(&self, name: &ServerName) -> Result<Vec<String>>;

    /// Process status fields of the running engine.
    async fn memory(&self, name: &ServerName) -> Result<BTreeMap<String, String>>;

    // =========================================================================
    // Console and Probes
    // =========================================================================

    /// Type one line into the console.
    async fn send(&self, name: &ServerName, command: &str) -> Result<()>;

    /// Send `save-all` and wait `delay` (default from config).
    async fn saveall(&self, name: &ServerName, delay: Option<Duration>) -> Result<()>;

    /// Whether autosave was on before probing. The prior state is restored.
    async fn autosave(&self, name: &ServerName) -> Result<bool>;

    /// Server list ping on the loopback interface.
    async fn ping(&self, name: &ServerName) -> Result<PingResult>;

    /// Full statistics over the query protocol.
    async fn query(&self, name: &ServerName) -> Result<FullStat>;

    // =========================================================================
    // Backups and Archives
    // =========================================================================

    /// Take an incremental backup.
    async fn backup(&self, name: &ServerName) -> Result<()>;

    /// Archive the instance directory. Returns the archive file name.
    async fn archive(&self, name: &ServerName) -> Result<String>;

    /// Archive with world saves suspended and flushed.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::SaveNotConfirmed` if the engine never confirms
    /// the save; autosave is restored first.
    async fn archive_with_commit(&self, name: &ServerName) -> Result<String>;

    /// Increments of the backup destination. Empty if it is not one.
    async fn list_increments(&self, name: &ServerName) -> Result<Vec<Increment>>;

    /// Archives, newest first.
    async fn list_archives(&self, name: &ServerName) -> Result<Vec<Archive>>;

    /// Drop increments older than `retention`.
    async fn prune(&self, name: &ServerName, retention: &str) -> Result<()>;

    /// Roll the instance back to increment `step`.
    async fn restore(&self, name: &ServerName, step: &str) -> Result<()>;

    /// Content of `file` as of increment `step`.
    async fn previous_version(&self, name: &ServerName, file: &str, step: &str)
        -> Result<String>;

    /// `server.properties` as of increment `step`.
    async fn previous_properties(&self, name: &ServerName, step: &str)
        -> Result<PropertyDocument>;

    /// Delete one archive file.
    async fn delete_archive(&self, name: &ServerName, filename: &str) -> Result<()>;

    // =========================================================================
    // Operational
    // =========================================================================

    /// Where each external tool resolves.
    fn dependencies(&self) -> Vec<Dependency>;
}

/// The main server control implementation.
pub struct ControlService<H: Host, S: Store> {
    host: Arc<H>,
    store: Arc<S>,
    config: ControlConfig,
    layout: BaseLayout,
}

fn check_tool(server: &ServerName, tool: &str, output: ToolOutput) -> Result<ToolOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(ControlError::ExternalTool {
            server: server.clone(),
            tool: tool.to_string(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

fn invalid(server: &ServerName, reason: impl Into<String>) -> ControlError {
    ControlError::InvalidArgument {
        server: server.clone(),
        reason: reason.into(),
    }
}

fn is_runnable_asset(file: &str) -> bool {
    let lower = file.to_ascii_lowercase();
    lower.ends_with(".jar") || launch::is_phar(file) || file == "Cuberite"
}

async fn file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

async fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl<H: Host + 'static, S: Store + 'static> ControlService<H, S> {
    /// Create a new control service.
    #[must_use]
    pub fn new(host: Arc<H>, store: Arc<S>, config: ControlConfig) -> Self {
        let layout = BaseLayout::new(&config.base_dir);
        Self {
            host,
            store,
            config,
            layout,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(host: Arc<H>, store: Arc<S>) -> Self {
        Self::new(host, store, ControlConfig::default())
    }

    /// Get a reference to the host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Get the directory layout.
    #[must_use]
    pub const fn layout(&self) -> &BaseLayout {
        &self.layout
    }

    /// Resolve the directory set of one server.
    #[must_use]
    pub fn paths(&self, name: &ServerName) -> ServerPaths {
        self.layout.server(name)
    }

    /// Check `operation` against freshly observed state.
    async fn require(&self, name: &ServerName, operation: Operation) -> Result<ServerPaths> {
        let exists = self.exists(name).await?;
        let running = self.is_running(name).await?;
        lifecycle::require(name, operation, exists, running)?;
        Ok(self.paths(name))
    }

    async fn resolve_launch(&self, name: &ServerName, paths: &ServerPaths) -> Result<LaunchKind> {
        let config = self.store.load(&paths.server_config()).await?;
        let java = &self.config.tools.java;
        LaunchKind::resolve(name, &config, paths.instance_dir(), || {
            locate(java).map(|p| p.display().to_string())
        })
        .await
    }

    async fn run_tool(&self, name: &ServerName, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(server = %name, command = %invocation, "Running tool");
        let output = self.host.run(invocation).await?;
        check_tool(name, invocation.program_name(), output)
    }

    /// Copy changed profile files into the instance.
    async fn apply_profile(
        &self,
        name: &ServerName,
        paths: &ServerPaths,
        profile_name: &str,
        owner: &Owner,
    ) -> Result<()> {
        let rsync = &self.config.tools.rsync;
        let source = paths.profile(profile_name);

        let delta = profile::delta_invocation(rsync, &source, paths.instance_dir());
        debug!(server = %name, command = %delta, "Computing profile delta");
        let output = self.host.run(&delta).await?;
        if !profile::delta_succeeded(output.code) {
            check_tool(name, rsync, output)?;
            return Ok(());
        }
        if output.code == Some(profile::PARTIAL_TRANSFER) {
            warn!(server = %name, profile = %profile_name, "Profile source incomplete, skipping");
            return Ok(());
        }

        let changed = profile::parse_delta(&output.stdout);
        if changed.is_empty() {
            debug!(server = %name, profile = %profile_name, "Profile already in sync");
            return Ok(());
        }

        info!(
            server = %name,
            profile = %profile_name,
            files = changed.len(),
            "Applying profile"
        );
        let sync = profile::sync_invocation(rsync, &source, paths.instance_dir(), owner);
        self.run_tool(name, &sync).await?;
        Ok(())
    }

    /// Poll the process table until `name` is gone, then settle in `Stopped`.
    async fn wait_until_gone(&self, name: &ServerName, pending: ServerState) -> Result<()> {
        debug_assert!(pending.is_transient());
        for _ in 0..self.config.max_poll_iterations {
            if !self.is_running(name).await? {
                lifecycle::transition(name, pending, ServerState::Stopped);
                return Ok(());
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        if self.is_running(name).await? {
            warn!(server = %name, state = %pending, "Server did not exit in time");
            return Err(ControlError::StuckProcess {
                server: name.clone(),
                waited: self.config.stop_bound(),
            });
        }
        lifecycle::transition(name, pending, ServerState::Stopped);
        Ok(())
    }

    /// Type into a console known to be up.
    async fn stuff(&self, name: &ServerName, paths: &ServerPaths, command: &str) -> Result<()> {
        let owner = Owner::of(paths.instance_dir()).await?;
        let invocation = console::console_invocation(&self.config.tools.screen, name, command)
            .current_dir(paths.instance_dir())
            .credentials(owner.credentials());
        self.run_tool(name, &invocation).await?;
        Ok(())
    }

    /// Probe autosave on a console known to be up.
    async fn probe_autosave(&self, name: &ServerName, paths: &ServerPaths) -> Result<bool> {
        let mut watch = LogWatch::attach(paths.latest_log()).await;
        self.stuff(name, paths, commands::SAVE_ON).await?;

        match watch
            .wait_for(
                &[AUTOSAVE_ALREADY_ON, AUTOSAVE_TURNED_ON],
                self.config.autosave_probe_window,
            )
            .await
        {
            Some(1) => {
                self.stuff(name, paths, commands::SAVE_OFF).await?;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => {
                debug!(server = %name, "No autosave confirmation, assuming on");
                Ok(true)
            }
        }
    }

    async fn archive_unchecked(&self, name: &ServerName, paths: &ServerPaths) -> Result<String> {
        let owner = Owner::of(paths.instance_dir()).await?;
        let filename = backup::archive_filename(name, Local::now());
        let invocation = backup::archive_invocation(&self.config.tools.tar, paths, &filename)
            .credentials(owner.credentials());
        self.run_tool(name, &invocation).await?;
        info!(server = %name, archive = %filename, "Archived server");
        Ok(filename)
    }

    async fn backup_unchecked(&self, name: &ServerName, paths: &ServerPaths) -> Result<()> {
        let owner = Owner::of(paths.instance_dir()).await?;
        let invocation = backup::backup_invocation(
            &self.config.tools.rdiff_backup,
            paths,
            &self.config.backup_exclude,
        )
        .credentials(owner.credentials());
        self.run_tool(name, &invocation).await?;
        info!(server = %name, "Backed up server");
        Ok(())
    }

    /// Create directories and empty documents, all owned by `owner`.
    async fn create_instance(&self, name: &ServerName, owner: &Owner) -> Result<ServerPaths> {
        let paths = self.require(name, Operation::Create).await?;

        for dir in [paths.instance_dir(), paths.backup_dir(), paths.archive_dir()] {
            tokio::fs::create_dir_all(dir).await?;
            owner.assign(dir)?;
        }
        for file in [
            paths.server_properties(),
            paths.server_config(),
            paths.cron_config(),
        ] {
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file)
                .await?;
            owner.assign(&file)?;
        }

        Ok(paths)
    }

    fn server_port(name: &ServerName, properties: &PropertyDocument, key: &str) -> Result<u16> {
        properties.get_int(ROOT_SECTION, key).map_or(
            Ok(DEFAULT_SERVER_PORT),
            |port| {
                u16::try_from(port).map_err(|_| {
                    ControlError::configuration(name, format!("{key} out of range: {port}"))
                })
            },
        )
    }
}

#[async_trait]
impl<H: Host + 'static, S: Store + 'static> ServerControl for ControlService<H, S> {
    // =========================================================================
    // Discovery
    // =========================================================================

    async fn list_servers(&self) -> Result<Vec<ServerName>> {
        let servers = self.layout.servers();
        let names = match file_names(&servers).await {
            Ok(names) => names,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        for name in names {
            let path = servers.join(&name);
            let Ok(server) = self.layout.server_name_from_path(&path) else {
                continue;
            };
            if tokio::fs::metadata(&path)
                .await
                .is_ok_and(|m| m.is_dir())
            {
                found.push(server);
            }
        }
        Ok(found)
    }

    async fn servers_up(&self) -> Result<Vec<ServerName>> {
        let processes = self.host.scan().await?;
        Ok(processes
            .keys()
            .filter_map(|name| ServerName::parse(name).ok())
            .collect())
    }

    async fn exists(&self, name: &ServerName) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.paths(name).server_properties()).await?)
    }

    async fn is_running(&self, name: &ServerName) -> Result<bool> {
        Ok(self.host.scan().await?.contains_key(name.as_str()))
    }

    async fn state(&self, name: &ServerName) -> Result<ServerState> {
        let exists = self.exists(name).await?;
        let running = self.is_running(name).await?;
        Ok(ServerState::observe(exists, running))
    }

    async fn process(&self, name: &ServerName) -> Result<Option<ProcessRecord>> {
        Ok(self.host.scan().await?.get(name.as_str()).copied())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn create(&self, name: &ServerName, owner: &Owner) -> Result<()> {
        let paths = self.create_instance(name, owner).await?;

        self.store
            .overlay(
                &paths.server_properties(),
                ROOT_SECTION,
                &SERVER_PROPERTIES_DEFAULTS,
            )
            .await?;
        self.store
            .modify(&paths.server_config(), "java", "java_xmx", "256")
            .await?;
        self.store
            .modify(&paths.server_config(), "onreboot", "start", "false")
            .await?;

        lifecycle::transition(name, ServerState::Absent, ServerState::Stopped);
        info!(server = %name, owner = %owner.chown_spec(), "Created server");
        Ok(())
    }

    async fn create_unconventional(&self, name: &ServerName, owner: &Owner) -> Result<()> {
        let paths = self.create_instance(name, owner).await?;
        self.store
            .modify(&paths.server_config(), "minecraft", "unconventional", "true")
            .await?;

        info!(server = %name, owner = %owner.chown_spec(), "Created unconventional server");
        Ok(())
    }

    async fn create_from_archive(
        &self,
        name: &ServerName,
        owner: &Owner,
        archive: &Path,
    ) -> Result<()> {
        if !backup::is_importable(archive) {
            return Err(invalid(
                name,
                format!("unsupported archive type: {}", archive.display()),
            ));
        }
        let source = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            self.layout.imports().join(archive)
        };

        self.create(name, owner).await?;

        let paths = self.paths(name);
        let invocation = backup::extract_invocation(&self.config.tools.tar, &paths, &source)
            .credentials(owner.credentials());
        self.run_tool(name, &invocation).await?;

        info!(server = %name, archive = %source.display(), "Imported server");
        Ok(())
    }

    async fn delete(&self, name: &ServerName) -> Result<()> {
        let paths = self.require(name, Operation::Delete).await?;

        remove_dir_if_present(paths.instance_dir()).await?;
        remove_dir_if_present(paths.backup_dir()).await?;
        remove_dir_if_present(paths.archive_dir()).await?;

        lifecycle::transition(name, ServerState::Stopped, ServerState::Absent);
        info!(server = %name, "Deleted server");
        Ok(())
    }

    async fn start(&self, name: &ServerName) -> Result<()> {
        let paths = self.require(name, Operation::Start).await?;
        let owner = Owner::of(paths.instance_dir()).await?;
        let kind = self.resolve_launch(name, &paths).await?;

        let config = self.store.load(&paths.server_config()).await?;
        if let Some(profile_name) = config.get_non_empty("minecraft", "profile") {
            self.apply_profile(name, &paths, profile_name, &owner).await?;
        }

        let invocation = Invocation::new(&self.config.tools.screen)
            .args(kind.args(name))
            .current_dir(paths.instance_dir())
            .credentials(owner.credentials());
        let pending = lifecycle::transition(name, ServerState::Stopped, ServerState::Starting);
        debug!(server = %name, command = %invocation, "Spawning console session");
        let output = self.host.launch(&invocation).await?;
        check_tool(name, &self.config.tools.screen, output)?;

        tokio::time::sleep(self.config.settle_delay).await;
        lifecycle::transition(name, pending, ServerState::Running);
        info!(server = %name, "Started server");
        Ok(())
    }

    async fn stop(&self, name: &ServerName) -> Result<()> {
        let paths = self.require(name, Operation::Stop).await?;

        info!(server = %name, "Stopping server");
        self.stuff(name, &paths, commands::STOP).await?;
        let pending = lifecycle::transition(name, ServerState::Running, ServerState::Stopping);
        self.wait_until_gone(name, pending).await?;

        info!(server = %name, "Stopped server");
        Ok(())
    }

    async fn kill(&self, name: &ServerName) -> Result<()> {
        self.require(name, Operation::Kill).await?;
        let engine = self
            .process(name)
            .await?
            .and_then(|record| record.engine)
            .ok_or_else(|| ControlError::precondition(name, Precondition::EngineNotFound))?;

        warn!(server = %name, pid = engine, "Killing server");
        self.host.kill(engine).await?;
        let pending = lifecycle::transition(name, ServerState::Running, ServerState::Killing);
        self.wait_until_gone(name, pending).await?;

        info!(server = %name, "Killed server");
        Ok(())
    }

    async fn restart(&self, name: &ServerName) -> Result<()> {
        self.stop(name).await?;
        self.start(name).await
    }

    async fn stop_and_backup(&self, name: &ServerName) -> Result<()> {
        self.stop(name).await?;
        self.backup(name).await
    }

    async fn launch_args(&self, name: &ServerName) -> Result<Vec<String>> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(self.resolve_launch(name, &paths).await?.args(name))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    async fn properties(&self, name: &ServerName) -> Result<PropertyDocument> {
        Ok(self.store.load(&self.paths(name).server_properties()).await?)
    }

    async fn server_config(&self, name: &ServerName) -> Result<PropertyDocument> {
        Ok(self.store.load(&self.paths(name).server_config()).await?)
    }

    async fn modify_properties(
        &self,
        name: &ServerName,
        key: &str,
        value: &str,
    ) -> Result<PropertyDocument> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(self
            .store
            .modify(&paths.server_properties(), ROOT_SECTION, key, value)
            .await?)
    }

    async fn overlay_properties(
        &self,
        name: &ServerName,
        entries: &[(&str, &str)],
    ) -> Result<PropertyDocument> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(self
            .store
            .overlay(&paths.server_properties(), ROOT_SECTION, entries)
            .await?)
    }

    async fn modify_config(
        &self,
        name: &ServerName,
        section: &str,
        key: &str,
        value: &str,
    ) -> Result<PropertyDocument> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(self
            .store
            .modify(&paths.server_config(), section, key, value)
            .await?)
    }

    async fn onreboot_start(&self, name: &ServerName) -> Result<bool> {
        Ok(self.server_config(name).await?.get_bool("onreboot", "start"))
    }

    async fn unconventional(&self, name: &ServerName) -> Result<bool> {
        Ok(self.server_config(name).await?.get_bool("minecraft", "unconventional"))
    }

    async fn commit_interval(&self, name: &ServerName) -> Result<Option<i64>> {
        Ok(self
            .server_config(name)
            .await?
            .get_int("minecraft", "commit_interval")
            .filter(|interval| *interval > 0))
    }

    // =========================================================================
    // Cron Documents
    // =========================================================================

    async fn crons(&self, name: &ServerName) -> Result<PropertyDocument> {
        Ok(self.store.load(&self.paths(name).cron_config()).await?)
    }

    async fn add_cron(
        &self,
        name: &ServerName,
        id: &str,
        definition: &[(&str, &str)],
    ) -> Result<()> {
        if id.is_empty() {
            return Err(invalid(name, "cron identifier must not be empty"));
        }
        let paths = self.require(name, Operation::Inspect).await?;
        let path = paths.cron_config();

        let mut crons = self.store.load(&path).await?;
        crons.remove_section(id);
        for (key, value) in definition {
            crons.set(id, key, value);
        }
        crons.set(id, "enabled", "false");
        self.store.save(&path, &crons).await?;

        debug!(server = %name, cron = %id, "Added cron");
        Ok(())
    }

    async fn delete_cron(&self, name: &ServerName, id: &str) -> Result<bool> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(self.store.remove_section(&paths.cron_config(), id).await?)
    }

    async fn set_cron(&self, name: &ServerName, id: &str, enabled: bool) -> Result<()> {
        let paths = self.require(name, Operation::Inspect).await?;
        let path = paths.cron_config();

        let mut crons = self.store.load(&path).await?;
        if crons.section(id).is_none() {
            return Err(invalid(name, format!("no such cron: {id}")));
        }
        crons.set(id, "enabled", if enabled { "true" } else { "false" });
        self.store.save(&path, &crons).await?;
        Ok(())
    }

    // =========================================================================
    // Instance Information
    // =========================================================================

    async fn owner(&self, name: &ServerName) -> Result<Owner> {
        let paths = self.require(name, Operation::Inspect).await?;
        Ok(Owner::of(paths.instance_dir()).await?)
    }

    async fn eula(&self, name: &ServerName) -> Result<Option<bool>> {
        match tokio::fs::read_to_string(self.paths(name).eula()).await {
            Ok(text) => Ok(Some(text.lines().any(|l| EULA_ACCEPTED.is_match(l)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn accept_eula(&self, name: &ServerName) -> Result<()> {
        let paths = self.require(name, Operation::Inspect).await?;
        let owner = Owner::of(paths.instance_dir()).await?;

        tokio::fs::write(paths.eula(), "eula=true").await?;
        owner.assign(&paths.eula())?;

        info!(server = %name, "Accepted EULA");
        Ok(())
    }

    async fn server_files(&self, name: &ServerName) -> Result<Vec<String>> {
        let paths = self.require(name, Operation::Inspect).await?;

        let mut files: Vec<String> = file_names(paths.instance_dir())
            .await?
            .into_iter()
            .filter(|f| is_runnable_asset(f))
            .collect();

        let config = self.store.load(&paths.server_config()).await?;
        if let Some(profile_name) = config.get_non_empty("minecraft", "profile") {
            if let Ok(profile_files) = file_names(&paths.profile(profile_name)).await {
                for file in profile_files {
                    if is_runnable_asset(&file) && !files.contains(&file) {
                        files.push(file);
                    }
                }
            }
        }

        Ok(files)
    }

    async fn memory(&self, name: &ServerName) -> Result<BTreeMap<String, String>> {
        self.require(name, Operation::Probe).await?;
        let engine = self
            .process(name)
            .await?
            .and_then(|record| record.engine)
            .ok_or_else(|| ControlError::precondition(name, Precondition::EngineNotFound))?;

        self.host
            .process_status(engine)
            .await?
            .ok_or_else(|| ControlError::precondition(name, Precondition::NotRunning))
    }

    // =========================================================================
    // Console and Probes
    // =========================================================================

    async fn send(&self, name: &ServerName, command: &str) -> Result<()> {
        if command.contains('"') {
            return Err(invalid(name, "console input must not contain '\"'"));
        }
        let paths = self.require(name, Operation::Console).await?;
        debug!(server = %name, command = %command, "Console input");
        self.stuff(name, &paths, command).await
    }

    async fn saveall(&self, name: &ServerName, delay: Option<Duration>) -> Result<()> {
        self.send(name, commands::SAVE_ALL).await?;
        tokio::time::sleep(delay.unwrap_or(self.config.saveall_delay)).await;
        Ok(())
    }

    async fn autosave(&self, name: &ServerName) -> Result<bool> {
        let paths = self.require(name, Operation::Console).await?;
        self.probe_autosave(name, &paths).await
    }

    async fn ping(&self, name: &ServerName) -> Result<PingResult> {
        let paths = self.require(name, Operation::Probe).await?;
        if launch::config_is_phar(&self.store.load(&paths.server_config()).await?) {
            return Err(ControlError::precondition(name, Precondition::UnsupportedEngine));
        }

        let properties = self.store.load(&paths.server_properties()).await?;
        let port = Self::server_port(name, &properties, "server-port")?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        debug!(server = %name, addr = %addr, "Pinging server");
        Ok(blockhost_probe::ping(addr, self.config.probe_timeout).await?)
    }

    async fn query(&self, name: &ServerName) -> Result<FullStat> {
        let paths = self.require(name, Operation::Inspect).await?;
        let properties = self.store.load(&paths.server_properties()).await?;
        if !properties.get_bool(ROOT_SECTION, "enable-query") {
            return Err(ControlError::precondition(name, Precondition::QueryDisabled));
        }
        if launch::config_is_phar(&self.store.load(&paths.server_config()).await?) {
            return Err(ControlError::precondition(name, Precondition::UnsupportedEngine));
        }

        let key = if properties.get_int(ROOT_SECTION, "query.port").is_some() {
            "query.port"
        } else {
            "server-port"
        };
        let port = Self::server_port(name, &properties, key)?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        debug!(server = %name, addr = %addr, "Querying server");
        Ok(blockhost_probe::full_query(addr, self.config.probe_timeout).await?)
    }

    // =========================================================================
    // Backups and Archives
    // =========================================================================

    async fn backup(&self, name: &ServerName) -> Result<()> {
        let paths = self.require(name, Operation::Snapshot).await?;
        self.backup_unchecked(name, &paths).await
    }

    async fn archive(&self, name: &ServerName) -> Result<String> {
        let paths = self.require(name, Operation::Snapshot).await?;
        self.archive_unchecked(name, &paths).await
    }

    async fn archive_with_commit(&self, name: &ServerName) -> Result<String> {
        let paths = self.require(name, Operation::Console).await?;

        let autosave = self.probe_autosave(name, &paths).await?;
        self.stuff(name, &paths, commands::SAVE_OFF).await?;

        let mut watch = LogWatch::attach(paths.latest_log()).await;
        self.stuff(name, &paths, commands::SAVE_ALL).await?;
        let saved = watch
            .wait_for(&[WORLD_SAVED], self.config.save_commit_window)
            .await
            .is_some();

        if !saved {
            if autosave {
                if let Err(e) = self.stuff(name, &paths, commands::SAVE_ON).await {
                    warn!(server = %name, error = %e, "Cannot restore autosave");
                }
            }
            return Err(ControlError::SaveNotConfirmed {
                server: name.clone(),
                waited: self.config.save_commit_window,
            });
        }

        let archived = self.archive_unchecked(name, &paths).await;
        if autosave {
            self.stuff(name, &paths, commands::SAVE_ON).await?;
        }
        archived
    }

    async fn list_increments(&self, name: &ServerName) -> Result<Vec<Increment>> {
        let invocation = backup::list_invocation(&self.config.tools.rdiff_backup, &self.paths(name));
        debug!(server = %name, command = %invocation, "Listing increments");

        let output = self.host.run(&invocation).await?;
        if !output.success() {
            debug!(server = %name, code = ?output.code, "Not a backup destination");
            return Ok(Vec::new());
        }
        Ok(backup::parse_increments(&output.stdout))
    }

    async fn list_archives(&self, name: &ServerName) -> Result<Vec<Archive>> {
        Ok(backup::list_archives(self.paths(name).archive_dir()).await)
    }

    async fn prune(&self, name: &ServerName, retention: &str) -> Result<()> {
        if retention.trim().is_empty() {
            return Err(invalid(name, "retention must not be empty"));
        }
        let invocation =
            backup::prune_invocation(&self.config.tools.rdiff_backup, &self.paths(name), retention);
        self.run_tool(name, &invocation).await?;

        info!(server = %name, retention = %retention, "Pruned increments");
        Ok(())
    }

    async fn restore(&self, name: &ServerName, step: &str) -> Result<()> {
        let paths = self.require(name, Operation::Restore).await?;
        let invocation = backup::restore_invocation(&self.config.tools.rdiff_backup, &paths, step);
        self.run_tool(name, &invocation).await?;

        info!(server = %name, step = %step, "Restored server");
        Ok(())
    }

    async fn previous_version(
        &self,
        name: &ServerName,
        file: &str,
        step: &str,
    ) -> Result<String> {
        let relative = PathBuf::from(file);
        if file.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(invalid(name, format!("not a relative instance path: {file}")));
        }
        let paths = self.require(name, Operation::Inspect).await?;

        let scratch = tempfile::tempdir()?;
        let dest = scratch.path().join("previous");
        let invocation = backup::previous_version_invocation(
            &self.config.tools.rdiff_backup,
            &paths,
            file,
            step,
            &dest,
        );
        self.run_tool(name, &invocation).await?;

        Ok(tokio::fs::read_to_string(&dest).await?)
    }

    async fn previous_properties(&self, name: &ServerName, step: &str) -> Result<PropertyDocument> {
        let text = self
            .previous_version(name, blockhost_core::paths::SERVER_PROPERTIES, step)
            .await?;
        Ok(PropertyDocument::parse(&text))
    }

    async fn delete_archive(&self, name: &ServerName, filename: &str) -> Result<()> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename == "."
            || filename == ".."
        {
            return Err(invalid(name, format!("not an archive name: {filename}")));
        }

        tokio::fs::remove_file(self.paths(name).archive_dir().join(filename)).await?;
        info!(server = %name, archive = %filename, "Deleted archive");
        Ok(())
    }

    // =========================================================================
    // Operational
    // =========================================================================

    fn dependencies(&self) -> Vec<Dependency> {
        self.config
            .tools
            .all()
            .into_iter()
            .map(|(role, program)| Dependency {
                role: role.to_string(),
                program: program.to_string(),
                path: locate(program),
            })
            .collect()
    }
}
