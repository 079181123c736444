//! # flotilla - SSH Fleet Controller
//!
//! `flotilla` drives a fleet of remote nodes over SSH from a single
//! operator workstation: it dials every selected host in parallel
//! (tunneling through a master node where one is declared), synchronizes
//! local module directories onto the hosts with a content-addressed
//! differential transfer, and runs them either attached with streamed
//! output or detached under a tmux session.
//!
//! ## Features
//!
//! - **Parallel fan-out**: one worker per host, with master→child tunnel
//!   ordering enforced by per-host ready-signals
//! - **Minimal sync**: MD5 fingerprints classify changes into new, updated,
//!   moved, renamed and deleted, and only those are transferred
//! - **Bounded remote I/O**: a local commit image remembers the last
//!   deployed state so a diff reads O(last commit) remote files
//! - **Two run modes**: attached streaming or detached tmux sessions that
//!   survive the operator disconnecting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use flotilla::dispatch::Dispatcher;
//! use flotilla::inventory::Inventory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inventory = Inventory::load(Path::new("hosts.json"))?;
//!     let dispatcher = Dispatcher::connect(inventory, "all", true).await?;
//!
//!     // Deploy and start the module in ./jobx on every host, detached.
//!     dispatcher.run(Path::new("jobx"), true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`inventory::Inventory`] - Host registry and selector resolution
//! - [`session::connect_fleet`] - Parallel connection orchestrator
//! - [`sync::sync_module`] - Differential module synchronizer
//! - [`runner::run_module`] - Module lifecycle executor
//! - [`dispatch::Dispatcher`] - Operator command dispatch
//! - [`error::ControlError`] - Error type shared by all of the above

pub mod config;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod runner;
pub mod session;
pub mod sync;
