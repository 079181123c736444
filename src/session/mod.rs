//! SSH session management across the fleet.
//!
//! This module dials every selected host in parallel, honoring master→child
//! tunnel ordering, and hands back an immutable connection map the rest of
//! the process reads from.
//!
//! # Main Components
//!
//! - [`connect_fleet`] - Parallel connection fan-out with dependency gating
//! - [`NodeSession`] - One host's live handles and probed state
//! - [`NodeLink`] - SSH handle + SFTP session pair of a connected host
//! - [`NodeStatus`] - Result of the tmux availability probe

use std::sync::Arc;

use colored::Color;
use indexmap::IndexMap;
use russh::client::Handle;
use russh_sftp::client::SftpSession;

use crate::logging::scribe_host;

pub use client::{CommandOutput, NodeClient};
pub use orchestrator::connect_fleet;
pub use probe::NodeStatus;
pub use tty::interactive_shell;

/// Live handles of a connected host.
///
/// A host is observable as either connected (it has a `NodeLink`, carrying
/// both handles) or unavailable (it has none); there is no state with only
/// one of the two.
pub struct NodeLink {
    pub handle: Handle<NodeClient>,
    pub sftp: SftpSession,
}

/// One host's entry in the connection map.
pub struct NodeSession {
    pub callsign: String,
    pub link: Option<NodeLink>,
    pub status: NodeStatus,
}

impl NodeSession {
    pub fn connected(callsign: String, link: NodeLink, status: NodeStatus) -> Self {
        Self {
            callsign,
            link: Some(link),
            status,
        }
    }

    pub fn unavailable(callsign: String, cause: String) -> Self {
        Self {
            callsign,
            link: None,
            status: NodeStatus::Unavailable(cause),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Prints this host's color-coded status line: green for available and
    /// idle, yellow for busy or missing tmux, red for unavailable.
    pub fn report(&self) {
        match &self.status {
            NodeStatus::Idle => scribe_host(&self.callsign, "Available, Free", Some(Color::Green)),
            NodeStatus::Busy(jobs) => scribe_host(
                &self.callsign,
                &format!("Available, Busy running: {jobs:?}"),
                Some(Color::Yellow),
            ),
            NodeStatus::NoMultiplexer => scribe_host(
                &self.callsign,
                "Available: tmux not installed",
                Some(Color::Yellow),
            ),
            NodeStatus::Unavailable(_) => {
                scribe_host(&self.callsign, "Unavailable", Some(Color::Red))
            }
        }
    }
}

/// Connection state of the whole selected fleet, in resolution order.
///
/// Built once by [`connect_fleet`] and read-only afterwards. Sessions are
/// reference-counted so per-host workers can run against them in parallel.
pub type ConnectionMap = IndexMap<String, Arc<NodeSession>>;

mod client;
mod orchestrator;
pub mod probe;
mod tty;
