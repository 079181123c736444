//! Module lifecycle execution: sync, conditional build, run.
//!
//! A run first synchronizes the module, then executes its build script when
//! the sync demands it (or the operator forces it), then starts `run.sh`
//! either attached with streamed output or detached under a tmux session
//! that survives the connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use colored::Color;
use log::{debug, info};
use tokio::task::JoinSet;

use crate::config;
use crate::error::ControlError;
use crate::logging::{scribe, scribe_host};
use crate::session::{ConnectionMap, NodeSession};
use crate::sync::sync_module;

/// Knobs of one module run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Force the build step even when the sync did not trigger it.
    pub rebuild: bool,
    /// Run under a detached tmux session instead of streaming output.
    pub detach: bool,
    /// Fan out one worker per host instead of running hosts in sequence.
    pub parallel: bool,
    pub verbose: bool,
}

/// Runs a module across every host in the connection map.
///
/// Hosts without a live connection are reported and skipped. Remote
/// failures on one host never abort the others.
pub async fn run_module(
    connections: &ConnectionMap,
    module_dir: &Path,
    options: RunOptions,
) -> Result<(), ControlError> {
    let module = crate::sync::module_name(module_dir)?;
    if options.parallel {
        let mut workers = JoinSet::new();
        for session in connections.values() {
            workers.spawn(run_on_host(
                session.clone(),
                module_dir.to_path_buf(),
                module.clone(),
                options,
            ));
        }
        while workers.join_next().await.is_some() {}
    } else {
        for session in connections.values() {
            run_on_host(session.clone(), module_dir.to_path_buf(), module.clone(), options).await;
        }
    }
    Ok(())
}

/// Full sync → build → run sequence against one host.
async fn run_on_host(session: Arc<NodeSession>, module_dir: PathBuf, module: String, options: RunOptions) {
    let callsign = session.callsign.clone();
    let Some(link) = session.link.as_ref() else {
        scribe_host(&callsign, "Unreachable, skipping module run", Some(Color::Red));
        return;
    };

    if options.verbose {
        scribe_host(&callsign, &format!("Syncing module '{module}'.."), None);
    }
    let outcome = match sync_module(&link.sftp, &module_dir, options.verbose).await {
        Ok(outcome) => outcome,
        Err(err) => {
            scribe_host(&callsign, &format!("Sync failed: {err}"), Some(Color::Red));
            return;
        }
    };

    if (outcome.should_rebuild || options.rebuild) && module_dir.join(config::INIT_SCRIPT).is_file()
    {
        if options.verbose {
            scribe_host(&callsign, &format!("Building module '{module}'.."), None);
        }
        let build = format!(
            "cd {}/{}; bash {}",
            config::MODULES_ROOT,
            module,
            config::INIT_SCRIPT
        );
        match link.exec_streamed(&callsign, &build).await {
            Ok(Some(0)) | Ok(None) => {}
            Ok(Some(status)) => scribe_host(
                &callsign,
                &format!("Build exited with status {status}"),
                Some(Color::Red),
            ),
            Err(err) => {
                scribe_host(&callsign, &format!("Build failed: {err}"), Some(Color::Red));
                return;
            }
        }
    }

    if options.detach {
        if options.verbose {
            scribe_host(&callsign, &format!("Running '{module}' in detached mode.."), None);
        }
        if let Err(err) = spawn_detached(&session, &module).await {
            scribe_host(
                &callsign,
                &format!("Detached start failed: {err}"),
                Some(Color::Red),
            );
        }
    } else {
        if options.verbose {
            scribe_host(&callsign, &format!("Running '{module}' in stdout mode.."), None);
        }
        let run = format!(
            "cd {}/{}; bash {}",
            config::MODULES_ROOT,
            module,
            config::RUN_SCRIPT
        );
        match link.exec_streamed(&callsign, &run).await {
            Ok(Some(status)) if status != 0 => scribe_host(
                &callsign,
                &format!("Module exited with status {status}"),
                Some(Color::Red),
            ),
            Ok(_) => {}
            Err(err) => scribe_host(&callsign, &format!("Run failed: {err}"), Some(Color::Red)),
        }
    }
}

/// Starts `run.sh` inside a managed, timestamped tmux session and returns
/// as soon as the session exists.
async fn spawn_detached(session: &NodeSession, module: &str) -> Result<(), ControlError> {
    let link = session
        .link
        .as_ref()
        .ok_or_else(|| ControlError::HostUnavailable(session.callsign.clone()))?;
    let name = detached_session_name(module, Utc::now().timestamp());
    let command = format!(
        "tmux new-session -d -s {name} \"cd {}/{module}; bash {}\"",
        config::MODULES_ROOT,
        config::RUN_SCRIPT
    );
    debug!("[{}] {command}", session.callsign);
    let output = link.exec_capture(&command).await?;
    match output.exit_status {
        Some(0) | None => {
            info!("[{}] detached session {name} started", session.callsign);
            Ok(())
        }
        Some(status) => {
            scribe(&format!(
                "[{}] tmux exited with status {status}: {}",
                session.callsign,
                output.stderr.trim_end()
            ));
            Ok(())
        }
    }
}

/// Session names embed module and start time so the monitor can find them.
pub fn detached_session_name(module: &str, unix_seconds: i64) -> String {
    format!("{}{}_{}", config::MANAGED_SESSION_PREFIX, module, unix_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_names_carry_the_managed_prefix() {
        let name = detached_session_name("jobx", 1_718_000_000);
        assert_eq!(name, "_emp_jobx_1718000000");
        assert!(name.starts_with(config::MANAGED_SESSION_PREFIX));
    }
}
