//! Fixed operating parameters and environment knobs.
//!
//! Timeouts, reserved module file names and the managed tmux session prefix
//! live here so the connection, sync and execution layers agree on them.

use std::time::Duration;

/// Timeout for a direct SSH dial.
pub const DIRECT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for an SSH dial carried over a master's direct-tcpip channel.
pub const TUNNEL_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling for a child host's wait on its master's ready-signal.
pub const MASTER_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote directory under which every module is deployed.
pub const MODULES_ROOT: &str = "modules";

/// Prefix marking tmux sessions owned by this controller. Sessions without
/// it are ignored by the monitor.
pub const MANAGED_SESSION_PREFIX: &str = "_emp_";

/// Build trigger script looked up in the local module directory.
pub const INIT_SCRIPT: &str = "init.sh";

/// Execution entry point of a deployed module.
pub const RUN_SCRIPT: &str = "run.sh";

/// File whose appearance in NEW or UPDATED forces a rebuild.
pub const REBUILD_SENTINEL: &str = "requirements.txt";

/// Chunk size fed to the content fingerprint, one chunk at a time.
pub const HASH_CHUNK_SIZE: usize = 4096;

/// Name of the commit image file kept beside a module's local tree.
pub fn commit_image_name(module: &str) -> String {
    format!(".{module}_commit_image.json")
}

/// Whether the `RB` environment variable forces a module rebuild.
///
/// Any value that parses to a non-zero integer counts; everything else,
/// including an unset variable, does not.
pub fn rebuild_forced() -> bool {
    std::env::var("RB")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .is_some_and(|v| v != 0)
}

/// Log verbosity taken from the `V` environment variable.
///
/// 0 maps to errors only, 1 to info, 2 to debug. Values outside the range
/// are clamped.
pub fn log_level_from_env() -> log::LevelFilter {
    let v = std::env::var("V")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
        .clamp(0, 2);
    match v {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}
