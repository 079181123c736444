//! Multiplexer state probing.
//!
//! After a host connects, `tmux ls` is run once and its stdout/stderr pair
//! is classified into a [`NodeStatus`]. The same classification backs the
//! post-connect monitor.

use once_cell::sync::Lazy;
use regex::Regex;

use super::NodeLink;
use crate::config;
use crate::error::ControlError;

/// Leading session name of a `tmux ls` line, up to the first colon.
static SESSION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:\s]+):").expect("session name pattern"));

/// Availability of a host as seen by the connection probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// Connected, no multiplexer session running.
    Idle,
    /// Connected with running sessions; carries the managed session names.
    Busy(Vec<String>),
    /// Connected but tmux is not installed.
    NoMultiplexer,
    /// Connection could not be established; carries the cause.
    Unavailable(String),
}

/// Classifies the output of `tmux ls`.
///
/// An error stream beginning with "no server running" means tmux is present
/// but idle; "command not found" means the multiplexer is absent. A clean
/// error stream with listed sessions means the host is busy; only session
/// names carrying the managed prefix are reported.
pub fn classify(stdout: &str, stderr: &str) -> NodeStatus {
    if let Some(first) = stderr.lines().next() {
        if first.starts_with("no server running") {
            return NodeStatus::Idle;
        }
        if first.contains("command not found") {
            return NodeStatus::NoMultiplexer;
        }
        // Unexpected stderr still leaves the host usable.
        return NodeStatus::Idle;
    }
    let jobs = session_names(stdout)
        .into_iter()
        .filter(|name| name.starts_with(config::MANAGED_SESSION_PREFIX))
        .collect::<Vec<_>>();
    if stdout.lines().any(|line| !line.trim().is_empty()) {
        NodeStatus::Busy(jobs)
    } else {
        NodeStatus::Idle
    }
}

/// Extracts every session name from a `tmux ls` listing.
pub fn session_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| SESSION_NAME.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Runs the probe against a connected host.
pub async fn probe(link: &NodeLink) -> Result<NodeStatus, ControlError> {
    let output = link.exec_capture("tmux ls").await?;
    Ok(classify(&output.stdout, &output.stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_server_running_is_idle() {
        let status = classify("", "no server running on /tmp/tmux-1000/default\n");
        assert_eq!(status, NodeStatus::Idle);
    }

    #[test]
    fn missing_tmux_is_flagged() {
        let status = classify("", "bash: tmux: command not found\n");
        assert_eq!(status, NodeStatus::NoMultiplexer);
    }

    #[test]
    fn empty_streams_mean_idle() {
        assert_eq!(classify("", ""), NodeStatus::Idle);
    }

    #[test]
    fn managed_sessions_are_reported() {
        let stdout = "_emp_jobx_1718000000: 1 windows (created Mon Jun 10)\n\
                      scratch: 2 windows (created Mon Jun 10)\n";
        match classify(stdout, "") {
            NodeStatus::Busy(jobs) => assert_eq!(jobs, vec!["_emp_jobx_1718000000"]),
            other => panic!("expected busy, got {other:?}"),
        }
    }

    #[test]
    fn unmanaged_sessions_still_mean_busy() {
        let stdout = "scratch: 2 windows (created Mon Jun 10)\n";
        match classify(stdout, "") {
            NodeStatus::Busy(jobs) => assert!(jobs.is_empty()),
            other => panic!("expected busy, got {other:?}"),
        }
    }

    #[test]
    fn session_names_parse_listing() {
        let stdout = "_emp_a_1: 1 windows\nmain: 3 windows\n";
        assert_eq!(session_names(stdout), vec!["_emp_a_1", "main"]);
    }
}
