//! srcadmin instance supervision
//!
//! The process handle spawns and reaps one child server; the watchdog turns
//! unexpected exits into backed-off restarts; the manager owns both per
//! instance and drives the status state machine with store write-through.

pub mod launch;
pub mod manager;
pub mod process;
pub mod watchdog;

pub use launch::{build_launch_args, game_mode_values, server_exe_path};
pub use manager::InstanceManager;
pub use process::ProcessHandle;
pub use watchdog::Watchdog;
