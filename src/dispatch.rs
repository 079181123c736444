//! Operator command dispatch.
//!
//! The dispatcher owns the loaded inventory and the connection map the
//! orchestrator produced, and maps a command token onto the matching
//! operation. Unknown tokens produce a diagnostic and change nothing.

use std::path::Path;

use colored::Color;
use log::info;

use crate::config;
use crate::error::ControlError;
use crate::inventory::Inventory;
use crate::logging::{scribe, scribe_host};
use crate::runner::{run_module, RunOptions};
use crate::session::{connect_fleet, interactive_shell, probe, ConnectionMap};

/// Command tokens the dispatcher understands, with their usage lines.
const COMMANDS: &[(&str, &str)] = &[
    ("check", "re-probe multiplexer state across connected hosts"),
    ("tty", "open an interactive shell: tty <host>"),
    ("exec", "run a shell command on one host: exec <host> <command>"),
    ("execall", "run a shell command on every host: execall <command>"),
    ("attached", "sync, build and run a module, streaming output: attached <directory>"),
    ("detached", "sync, build and run a module under tmux: detached <directory>"),
    ("ls", "list available commands"),
];

/// Maps operator commands onto a connected fleet.
pub struct Dispatcher {
    inventory: Inventory,
    connections: ConnectionMap,
    verbose: bool,
}

impl Dispatcher {
    /// Connects the hosts the selector resolves to and wraps the result.
    pub async fn connect(
        inventory: Inventory,
        selector: &str,
        verbose: bool,
    ) -> Result<Self, ControlError> {
        let connections = connect_fleet(&inventory, selector).await?;
        Ok(Self {
            inventory,
            connections,
            verbose,
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn connections(&self) -> &ConnectionMap {
        &self.connections
    }

    /// Routes one command token to its operation.
    pub async fn dispatch(&self, token: &str, args: &[String]) -> Result<(), ControlError> {
        match token {
            "check" => self.check().await,
            "tty" => match args.first() {
                Some(host) => self.tty(host).await,
                None => {
                    scribe("usage: tty <host>");
                    Ok(())
                }
            },
            "exec" => match args.split_first() {
                Some((host, rest)) if !rest.is_empty() => {
                    self.exec(host, &rest.join(" ")).await
                }
                _ => {
                    scribe("usage: exec <host> <command>");
                    Ok(())
                }
            },
            "execall" => {
                if args.is_empty() {
                    scribe("usage: execall <command>");
                    Ok(())
                } else {
                    self.exec_all(&args.join(" ")).await
                }
            }
            "attached" | "detached" => match args.first() {
                Some(directory) => {
                    self.run(Path::new(directory), token == "detached").await
                }
                None => {
                    scribe(&format!("usage: {token} <directory>"));
                    Ok(())
                }
            },
            "ls" => {
                self.list_commands();
                Ok(())
            }
            unknown => {
                scribe(&format!("unknown command '{unknown}', try 'ls'"));
                Ok(())
            }
        }
    }

    /// Re-probes tmux state on every connected host. Unlike the connect
    /// probe, the monitor reports every session name, managed or not.
    pub async fn check(&self) -> Result<(), ControlError> {
        if self.verbose {
            scribe("Executing command \"tmux ls\" on all hosts");
        }
        for session in self.connections.values() {
            let Some(link) = session.link.as_ref() else {
                scribe_host(&session.callsign, "Unavailable", Some(Color::Red));
                continue;
            };
            let output = match link.exec_capture("tmux ls").await {
                Ok(output) => output,
                Err(err) => {
                    scribe_host(
                        &session.callsign,
                        &format!("Probe failed: {err}"),
                        Some(Color::Red),
                    );
                    continue;
                }
            };
            match probe::classify(&output.stdout, &output.stderr) {
                probe::NodeStatus::Busy(_) => {
                    let jobs = probe::session_names(&output.stdout);
                    scribe_host(
                        &session.callsign,
                        &format!("Busy running: {jobs:?}"),
                        Some(Color::Yellow),
                    );
                }
                probe::NodeStatus::NoMultiplexer => {
                    scribe_host(&session.callsign, "tmux not installed", Some(Color::Red));
                }
                _ => scribe_host(&session.callsign, "No tmux server running", Some(Color::Green)),
            }
        }
        Ok(())
    }

    /// Runs a shell command on one host, mirroring its output.
    pub async fn exec(&self, callsign: &str, command: &str) -> Result<(), ControlError> {
        let session = self
            .connections
            .get(callsign)
            .ok_or_else(|| ControlError::UnknownCallsign(callsign.to_string()))?;
        let Some(link) = session.link.as_ref() else {
            scribe_host(callsign, "Unreachable, command skipped", Some(Color::Red));
            return Ok(());
        };
        let status = link.exec_streamed(callsign, command).await?;
        if let Some(status) = status.filter(|status| *status != 0) {
            scribe_host(
                callsign,
                &format!("Command exited with status {status}"),
                Some(Color::Red),
            );
        }
        Ok(())
    }

    /// Runs a shell command on every host in sequence.
    pub async fn exec_all(&self, command: &str) -> Result<(), ControlError> {
        if self.verbose {
            scribe(&format!("Executing command \"{command}\" on all hosts"));
        }
        for callsign in self.connections.keys() {
            if let Err(err) = self.exec(callsign, command).await {
                scribe_host(callsign, &format!("Command failed: {err}"), Some(Color::Red));
            }
        }
        Ok(())
    }

    /// Opens an interactive shell on one host.
    pub async fn tty(&self, callsign: &str) -> Result<(), ControlError> {
        let session = self
            .connections
            .get(callsign)
            .ok_or_else(|| ControlError::UnknownCallsign(callsign.to_string()))?;
        let link = session
            .link
            .as_ref()
            .ok_or_else(|| ControlError::HostUnavailable(callsign.to_string()))?;
        info!("opening interactive shell on {callsign}");
        interactive_shell(link).await
    }

    /// Syncs, conditionally builds and runs a module on every connected
    /// host in parallel.
    pub async fn run(&self, module_dir: &Path, detach: bool) -> Result<(), ControlError> {
        let options = RunOptions {
            rebuild: config::rebuild_forced(),
            detach,
            parallel: true,
            verbose: self.verbose,
        };
        run_module(&self.connections, module_dir, options).await
    }

    /// Prints the token table.
    pub fn list_commands(&self) {
        for (token, usage) in COMMANDS {
            scribe(&format!("{token:<10} {usage}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    async fn empty_dispatcher() -> Dispatcher {
        let inventory = Inventory::from_records(IndexMap::new()).expect("inventory");
        Dispatcher::connect(inventory, "all", false)
            .await
            .expect("connect empty fleet")
    }

    #[tokio::test]
    async fn unknown_tokens_leave_state_unchanged() {
        let dispatcher = empty_dispatcher().await;
        dispatcher.dispatch("frobnicate", &[]).await.expect("diagnostic only");
        assert!(dispatcher.connections().is_empty());
    }

    #[tokio::test]
    async fn commands_with_missing_arguments_print_usage() {
        let dispatcher = empty_dispatcher().await;
        dispatcher.dispatch("tty", &[]).await.expect("usage line");
        dispatcher.dispatch("exec", &[]).await.expect("usage line");
        dispatcher.dispatch("attached", &[]).await.expect("usage line");
        dispatcher.dispatch("ls", &[]).await.expect("token table");
    }

    #[tokio::test]
    async fn exec_on_an_unknown_callsign_is_a_configuration_error() {
        let dispatcher = empty_dispatcher().await;
        let err = dispatcher.exec("ghost", "true").await.expect_err("unknown host");
        assert!(matches!(err, ControlError::UnknownCallsign(_)));
    }
}
