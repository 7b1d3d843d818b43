//! blockhost - manage Minecraft server instances on this host.
//!
//! This is the entry point for the `blockhost` binary. Results are printed
//! to stdout as JSON; diagnostics go to stderr.

mod commands;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use blockhost_control::{ControlError, ControlService};
use blockhost_os::SystemHost;
use blockhost_store::FileStore;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use commands::Command;

const DEBUG_FILTER: &str = "info,blockhost_control=debug,blockhost_os=debug,blockhost_store=debug";

/// blockhost - manage Minecraft server instances on this host.
#[derive(Parser, Debug)]
#[command(name = "blockhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: first of /etc/blockhost.conf,
    /// /usr/local/etc/blockhost.conf).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory holding servers/, backup/ and archive/.
    #[arg(long, global = true, env = "BLOCKHOST_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { DEBUG_FILTER } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<Value> {
    let config = settings::load(args.config.as_deref(), args.base_dir.as_deref()).await?;
    let host = SystemHost::new()?;
    let service = ControlService::new(Arc::new(host), Arc::new(FileStore::new()), config);
    Ok(args.command.run(&service).await?)
}

fn exit_code_of(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<ControlError>()
        .map_or(1, ControlError::exit_code)
        .clamp(1, 255)
        .try_into()
        .unwrap_or(1)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args).await {
        Ok(Value::Null) => ExitCode::SUCCESS,
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_of(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockhost_control::Precondition;
    use blockhost_core::ServerName;

    #[test]
    fn global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["blockhost", "start", "alpha", "--base-dir", "/srv/mc"]).unwrap();
        assert_eq!(args.base_dir, Some(PathBuf::from("/srv/mc")));
        assert!(matches!(args.command, Command::Start { .. }));
    }

    #[test]
    fn exit_codes_follow_control_errors() {
        let name = ServerName::parse("alpha").unwrap();
        let err = anyhow::Error::from(ControlError::precondition(&name, Precondition::AlreadyRunning));
        assert_eq!(exit_code_of(&err), 2);

        let other = anyhow::anyhow!("settings failed");
        assert_eq!(exit_code_of(&other), 1);
    }
}
