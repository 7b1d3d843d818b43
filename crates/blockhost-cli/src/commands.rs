//! Subcommands and their dispatch onto the control service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use blockhost_control::ServerControl;
use blockhost_core::ServerName;
use blockhost_os::Owner;
use clap::Subcommand;
use serde::Serialize;
use serde_json::{json, Value};

/// One `key=value` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value; may be empty.
    pub value: String,
}

fn parse_key_value(s: &str) -> Result<KeyValue, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok(KeyValue {
        key: key.trim().to_string(),
        value: value.trim().to_string(),
    })
}

fn parse_owner(s: &str) -> Result<Owner, String> {
    Owner::lookup(s).map_err(|e| e.to_string())
}

/// Every operation the front end exposes.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every instance.
    List,
    /// List running servers.
    Up,
    /// Show where the external tools resolve.
    Deps,
    /// Show the observed state and pids of a server.
    Status {
        /// Server name.
        name: ServerName,
    },
    /// Create a new instance.
    Create {
        /// Server name.
        name: ServerName,
        /// Owner as `user[:group]`; defaults to the current user.
        #[arg(long, value_parser = parse_owner)]
        owner: Option<Owner>,
        /// Seed only the unconventional marker.
        #[arg(long)]
        unconventional: bool,
    },
    /// Create an instance from a tar archive.
    Import {
        /// Server name.
        name: ServerName,
        /// Archive path; relative paths resolve under the import directory.
        archive: PathBuf,
        /// Owner as `user[:group]`; defaults to the current user.
        #[arg(long, value_parser = parse_owner)]
        owner: Option<Owner>,
    },
    /// Delete an instance with its backups and archives.
    Delete {
        /// Server name.
        name: ServerName,
    },
    /// Start a server.
    Start {
        /// Server name.
        name: ServerName,
    },
    /// Stop a server gracefully.
    Stop {
        /// Server name.
        name: ServerName,
    },
    /// Kill a server's engine.
    Kill {
        /// Server name.
        name: ServerName,
    },
    /// Stop, then start a server.
    Restart {
        /// Server name.
        name: ServerName,
    },
    /// Stop a server, then back it up.
    StopAndBackup {
        /// Server name.
        name: ServerName,
    },
    /// Print the launch arguments without starting.
    LaunchArgs {
        /// Server name.
        name: ServerName,
    },
    /// Print server.properties.
    Properties {
        /// Server name.
        name: ServerName,
    },
    /// Print server.config.
    Config {
        /// Server name.
        name: ServerName,
    },
    /// Set server.properties keys.
    SetProperty {
        /// Server name.
        name: ServerName,
        /// `key=value` pairs.
        #[arg(required = true, value_parser = parse_key_value)]
        entries: Vec<KeyValue>,
    },
    /// Set one server.config key.
    SetConfig {
        /// Server name.
        name: ServerName,
        /// Section.
        section: String,
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// Print cron.config.
    Crons {
        /// Server name.
        name: ServerName,
    },
    /// Add a disabled cron definition.
    AddCron {
        /// Server name.
        name: ServerName,
        /// Cron identifier.
        id: String,
        /// `key=value` pairs of the definition.
        #[arg(value_parser = parse_key_value)]
        definition: Vec<KeyValue>,
    },
    /// Remove a cron definition.
    DeleteCron {
        /// Server name.
        name: ServerName,
        /// Cron identifier.
        id: String,
    },
    /// Enable or disable a cron definition.
    SetCron {
        /// Server name.
        name: ServerName,
        /// Cron identifier.
        id: String,
        /// `true` or `false`.
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Show the owner of an instance.
    Owner {
        /// Server name.
        name: ServerName,
    },
    /// Show whether the EULA is accepted.
    Eula {
        /// Server name.
        name: ServerName,
    },
    /// Accept the EULA.
    AcceptEula {
        /// Server name.
        name: ServerName,
    },
    /// List runnable assets.
    Files {
        /// Server name.
        name: ServerName,
    },
    /// Show the engine's process status.
    Memory {
        /// Server name.
        name: ServerName,
    },
    /// Type a command into the console.
    Send {
        /// Server name.
        name: ServerName,
        /// Console command, words joined by spaces.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Save the world and wait.
    Saveall {
        /// Server name.
        name: ServerName,
        /// Seconds to wait after `save-all`.
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Report whether autosave is on.
    Autosave {
        /// Server name.
        name: ServerName,
    },
    /// Server list ping.
    Ping {
        /// Server name.
        name: ServerName,
    },
    /// Full statistics query.
    Query {
        /// Server name.
        name: ServerName,
    },
    /// Take an incremental backup.
    Backup {
        /// Server name.
        name: ServerName,
    },
    /// Archive the instance directory.
    Archive {
        /// Server name.
        name: ServerName,
        /// Suspend and flush world saves around the archive.
        #[arg(long)]
        commit: bool,
    },
    /// List backup increments.
    Increments {
        /// Server name.
        name: ServerName,
    },
    /// List archives, newest first.
    Archives {
        /// Server name.
        name: ServerName,
    },
    /// Drop increments older than a retention age (e.g. `5D`, `3B`).
    Prune {
        /// Server name.
        name: ServerName,
        /// Retention age or increment count.
        retention: String,
    },
    /// Roll an instance back to an increment.
    Restore {
        /// Server name.
        name: ServerName,
        /// Increment step (e.g. `1B`).
        step: String,
    },
    /// Print a file as of an increment.
    Previous {
        /// Server name.
        name: ServerName,
        /// Path relative to the instance directory.
        file: String,
        /// Increment step.
        step: String,
    },
    /// Print server.properties as of an increment.
    PreviousProperties {
        /// Server name.
        name: ServerName,
        /// Increment step.
        step: String,
    },
    /// Delete one archive.
    DeleteArchive {
        /// Server name.
        name: ServerName,
        /// Archive file name.
        filename: String,
    },
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<Value> {
    serde_json::to_value(value).context("cannot encode result as JSON")
}

fn pairs(entries: &[KeyValue]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .map(|kv| (kv.key.as_str(), kv.value.as_str()))
        .collect()
}

impl Command {
    /// Run against `control`, returning what should be printed.
    ///
    /// # Errors
    ///
    /// Returns the control error of the failed operation, or an encoding
    /// error if the result cannot be represented as JSON.
    pub async fn run<C: ServerControl + ?Sized>(self, control: &C) -> anyhow::Result<Value> {
        let output = match self {
            Self::List => to_json(&control.list_servers().await?)?,
            Self::Up => to_json(&control.servers_up().await?)?,
            Self::Deps => to_json(&control.dependencies())?,
            Self::Status { name } => {
                let state = control.state(&name).await?;
                let process = control.process(&name).await?;
                json!({ "server": name, "state": state, "process": process })
            }
            Self::Create {
                name,
                owner,
                unconventional,
            } => {
                let owner = owner.unwrap_or_else(Owner::current);
                if unconventional {
                    control.create_unconventional(&name, &owner).await?;
                } else {
                    control.create(&name, &owner).await?;
                }
                Value::Null
            }
            Self::Import {
                name,
                archive,
                owner,
            } => {
                let owner = owner.unwrap_or_else(Owner::current);
                control.create_from_archive(&name, &owner, &archive).await?;
                Value::Null
            }
            Self::Delete { name } => {
                control.delete(&name).await?;
                Value::Null
            }
            Self::Start { name } => {
                control.start(&name).await?;
                Value::Null
            }
            Self::Stop { name } => {
                control.stop(&name).await?;
                Value::Null
            }
            Self::Kill { name } => {
                control.kill(&name).await?;
                Value::Null
            }
            Self::Restart { name } => {
                control.restart(&name).await?;
                Value::Null
            }
            Self::StopAndBackup { name } => {
                control.stop_and_backup(&name).await?;
                Value::Null
            }
            Self::LaunchArgs { name } => to_json(&control.launch_args(&name).await?)?,
            Self::Properties { name } => to_json(&control.properties(&name).await?)?,
            Self::Config { name } => to_json(&control.server_config(&name).await?)?,
            Self::SetProperty { name, entries } => {
                to_json(&control.overlay_properties(&name, &pairs(&entries)).await?)?
            }
            Self::SetConfig {
                name,
                section,
                key,
                value,
            } => to_json(&control.modify_config(&name, &section, &key, &value).await?)?,
            Self::Crons { name } => to_json(&control.crons(&name).await?)?,
            Self::AddCron {
                name,
                id,
                definition,
            } => {
                control.add_cron(&name, &id, &pairs(&definition)).await?;
                Value::Null
            }
            Self::DeleteCron { name, id } => json!(control.delete_cron(&name, &id).await?),
            Self::SetCron { name, id, enabled } => {
                control.set_cron(&name, &id, enabled).await?;
                Value::Null
            }
            Self::Owner { name } => to_json(&control.owner(&name).await?)?,
            Self::Eula { name } => json!(control.eula(&name).await?),
            Self::AcceptEula { name } => {
                control.accept_eula(&name).await?;
                Value::Null
            }
            Self::Files { name } => to_json(&control.server_files(&name).await?)?,
            Self::Memory { name } => to_json(&control.memory(&name).await?)?,
            Self::Send { name, command } => {
                control.send(&name, &command.join(" ")).await?;
                Value::Null
            }
            Self::Saveall { name, delay } => {
                control
                    .saveall(&name, delay.map(Duration::from_secs))
                    .await?;
                Value::Null
            }
            Self::Autosave { name } => json!(control.autosave(&name).await?),
            Self::Ping { name } => to_json(&control.ping(&name).await?)?,
            Self::Query { name } => to_json(&control.query(&name).await?)?,
            Self::Backup { name } => {
                control.backup(&name).await?;
                Value::Null
            }
            Self::Archive { name, commit } => {
                let filename = if commit {
                    control.archive_with_commit(&name).await?
                } else {
                    control.archive(&name).await?
                };
                json!(filename)
            }
            Self::Increments { name } => to_json(&control.list_increments(&name).await?)?,
            Self::Archives { name } => to_json(&control.list_archives(&name).await?)?,
            Self::Prune { name, retention } => {
                control.prune(&name, &retention).await?;
                Value::Null
            }
            Self::Restore { name, step } => {
                control.restore(&name, &step).await?;
                Value::Null
            }
            Self::Previous { name, file, step } => {
                json!(control.previous_version(&name, &file, &step).await?)
            }
            Self::PreviousProperties { name, step } => {
                to_json(&control.previous_properties(&name, &step).await?)?
            }
            Self::DeleteArchive { name, filename } => {
                control.delete_archive(&name, &filename).await?;
                Value::Null
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use blockhost_control::{ControlConfig, ControlError, ControlService, Precondition};
    use std::collections::BTreeMap;
    use blockhost_os::MockHost;
    use blockhost_store::FileStore;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn parse(args: &[&str]) -> Command {
        TestCli::try_parse_from(std::iter::once("blockhost").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    fn setup() -> (ControlService<MockHost, FileStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = ControlConfig {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            ..ControlConfig::with_base_dir(dir.path())
        };
        let service = ControlService::new(
            Arc::new(MockHost::new()),
            Arc::new(FileStore::new()),
            config,
        );
        (service, dir)
    }

    #[test]
    fn key_values() {
        assert_eq!(
            parse_key_value("motd=A Server").unwrap(),
            KeyValue {
                key: "motd".into(),
                value: "A Server".into()
            }
        );
        assert_eq!(parse_key_value("level-seed=").unwrap().value, "");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn unencodable_results_are_errors() {
        let keyed_by_pairs = BTreeMap::from([((1, 2), 3)]);
        let err = to_json(&keyed_by_pairs).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn invalid_names_are_rejected_by_the_parser() {
        let result = TestCli::try_parse_from(["blockhost", "start", ".hidden"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_configure_and_inspect() {
        let (service, _dir) = setup();

        assert_eq!(parse(&["create", "alpha"]).run(&service).await.unwrap(), Value::Null);
        parse(&["set-property", "alpha", "motd=hello", "max-players=8"])
            .run(&service)
            .await
            .unwrap();
        parse(&["set-config", "alpha", "java", "jarfile", "server.jar"])
            .run(&service)
            .await
            .unwrap();

        let properties = parse(&["properties", "alpha"]).run(&service).await.unwrap();
        assert_eq!(properties[""]["motd"], "hello");
        assert_eq!(properties[""]["max-players"], "8");

        let status = parse(&["status", "alpha"]).run(&service).await.unwrap();
        assert_eq!(status["state"], "stopped");
        assert_eq!(status["process"], Value::Null);

        let list = parse(&["list"]).run(&service).await.unwrap();
        assert_eq!(list, json!(["alpha"]));
    }

    #[tokio::test]
    async fn errors_carry_exit_codes() {
        let (service, _dir) = setup();

        let err = parse(&["stop", "alpha"]).run(&service).await.unwrap_err();
        let err = err.downcast_ref::<ControlError>().unwrap();
        assert_eq!(err.violation(), Some(Precondition::NotFound));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn send_joins_words() {
        let (service, _dir) = setup();
        parse(&["create", "alpha"]).run(&service).await.unwrap();
        service.host().insert_running("alpha");

        parse(&["send", "alpha", "say", "hello", "world"])
            .run(&service)
            .await
            .unwrap();

        let sent = service.host().invocations_of("screen");
        assert_eq!(
            sent[0].get_args().last().unwrap(),
            "stuff \"say hello world\\012\""
        );
    }
}
