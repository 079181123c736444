//! Diagnostic logging and operator-facing output.
//!
//! Two channels leave this process: `log` records formatted by `env_logger`
//! for diagnostics, and `scribe` lines for the operator. Both share the
//! `[HH:MM:SS.mmm]` timestamp; scribe lines additionally carry the host
//! callsign they refer to and may be colored.

use std::io::Write;

use colored::{Color, Colorize};

use crate::config;

/// Current wall-clock time as `HH:MM:SS.mmm`.
pub fn time_str() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Configures the global logger.
///
/// The level comes from the `V` environment variable; `--verbose` raises it
/// to at least info. Safe to call more than once.
pub fn init(verbose: bool) {
    let mut level = config::log_level_from_env();
    if verbose && level < log::LevelFilter::Info {
        level = log::LevelFilter::Info;
    }
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}

/// Prints an operator line without a host context.
pub fn scribe(message: &str) {
    println!("[{}] | {}", time_str(), message);
}

/// Prints an operator line annotated with the host it concerns.
pub fn scribe_host(callsign: &str, message: &str, color: Option<Color>) {
    let line = format!("[{}] | [{}] {}", time_str(), callsign, message);
    match color {
        Some(color) => println!("{}", line.color(color)),
        None => println!("{line}"),
    }
}
