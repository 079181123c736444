//! Error types for fleet connection, synchronization and module execution.
//!
//! This module defines all errors that can occur while loading the host
//! inventory, dialing nodes, transferring module files and driving remote
//! commands.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during fleet control operations.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The host inventory file could not be read.
    #[error("inventory file {0:?} cannot be read")]
    InventoryRead(PathBuf, #[source] std::io::Error),

    /// The host inventory file is not a valid host map.
    #[error("inventory file {0:?} is not a valid host map")]
    InventoryParse(PathBuf, #[source] serde_json::Error),

    /// The callsign is not present in the inventory.
    #[error("unknown callsign '{0}'")]
    UnknownCallsign(String),

    /// The selector matched no host in the inventory.
    #[error("selector '{0}' matches no host")]
    UnknownSelector(String),

    /// A host names a master that is not in the inventory.
    #[error("host '{host}' names missing master '{master}'")]
    MissingMaster { host: String, master: String },

    /// A host's master chain loops back on itself.
    #[error("master chain starting at '{0}' forms a cycle")]
    MasterCycle(String),

    /// The SSH server rejected password authentication.
    #[error("authentication rejected by '{0}'")]
    AuthRejected(String),

    /// The SSH dial did not complete within its timeout.
    #[error("dial timed out for '{0}'")]
    DialTimeout(String),

    /// A tunneled host cannot connect because its master ended unavailable.
    #[error("master '{master}' unavailable, cannot tunnel to '{host}'")]
    MasterUnavailable { host: String, master: String },

    /// The bounded wait on the master's ready-signal elapsed.
    #[error("timed out waiting for master '{master}' of '{host}'")]
    MasterWait { host: String, master: String },

    /// An operation targeted a host without a live connection.
    #[error("host '{0}' is unreachable")]
    HostUnavailable(String),

    /// The local module directory does not exist.
    #[error("module directory {0:?} does not exist")]
    ModuleMissing(PathBuf),

    /// The commit image on disk could not be parsed.
    #[error("commit image {0:?} is corrupted")]
    CommitImage(PathBuf, #[source] serde_json::Error),

    /// An error occurred in the russh transport layer.
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    /// An error occurred in the SFTP subsystem.
    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// A local filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
