use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use flotilla::dispatch::Dispatcher;
use flotilla::inventory::Inventory;
use flotilla::logging;

/// SSH fleet controller: synchronize, build and run modules on remote
/// nodes.
#[derive(Parser)]
#[command(name = "flotilla", version, about)]
struct Cli {
    /// Narrate sync, build and run progress.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Host inventory file.
    #[arg(long, global = true, default_value = "hosts.json")]
    hosts: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a directory as a module and stream its output.
    Attached {
        /// Host selector: a callsign, a callsign prefix, or "all".
        host: String,
        /// Local module directory.
        directory: PathBuf,
    },
    /// Deploy a directory as a module under a detached tmux session.
    Detached {
        host: String,
        directory: PathBuf,
    },
    /// Execute a shell command on a host (or "all").
    Command {
        host: String,
        /// Command line to run remotely.
        cmd: String,
    },
    /// Open an interactive shell on a host.
    Tty { host: String },
    /// Probe multiplexer state across all hosts.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("flotilla: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let inventory = Inventory::load(&cli.hosts)
        .with_context(|| format!("loading inventory from {}", cli.hosts.display()))?;

    match cli.command {
        Command::Attached { host, directory } => {
            let dispatcher = connect(inventory, &host, cli.verbose).await?;
            dispatcher.run(&directory, false).await?;
        }
        Command::Detached { host, directory } => {
            let dispatcher = connect(inventory, &host, cli.verbose).await?;
            dispatcher.run(&directory, true).await?;
        }
        Command::Command { host, cmd } => {
            let dispatcher = connect(inventory, &host, cli.verbose).await?;
            if dispatcher.connections().contains_key(&host) {
                dispatcher.exec(&host, &cmd).await?;
            } else {
                // "all" or a prefix: run across the whole resolved set.
                dispatcher.exec_all(&cmd).await?;
            }
        }
        Command::Tty { host } => {
            let dispatcher = connect(inventory, &host, cli.verbose).await?;
            dispatcher.tty(&host).await?;
        }
        Command::Check => {
            let dispatcher = connect(inventory, "all", cli.verbose).await?;
            dispatcher.check().await?;
        }
    }
    Ok(())
}

async fn connect(inventory: Inventory, selector: &str, verbose: bool) -> anyhow::Result<Dispatcher> {
    Dispatcher::connect(inventory, selector, verbose)
        .await
        .with_context(|| format!("connecting to '{selector}'"))
}
