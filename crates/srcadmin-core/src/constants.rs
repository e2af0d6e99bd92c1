//! Constants and default values for srcadmin

use std::path::PathBuf;
use std::time::Duration;

/// srcadmin home directory name
pub const SRCADMIN_DIR: &str = ".srcadmin";

/// Database file name
pub const DB_FILE: &str = "srcadmin.db";

/// Map loaded when an instance does not name one
pub const DEFAULT_MAP: &str = "de_dust2";

/// Player slots when an instance does not set a limit
pub const DEFAULT_MAX_PLAYERS: u32 = 10;

/// Admin-channel secret applied when the stored secret is empty
pub const DEFAULT_RCON_PASSWORD: &str = "changeme";

/// Deadline for socket dial/read/write on the admin channel
pub const RCON_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a graceful process stop waits before force-killing
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Polling granularity while waiting for a graceful exit
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watchdog restart delay after the first unexpected exit
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the watchdog's doubling restart delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A run longer than this resets the watchdog backoff to the initial value
pub const BACKOFF_RESET_UPTIME: Duration = Duration::from_secs(60);

/// Metrics sampling period
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Window over which host CPU usage is averaged per sample
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(500);

/// Scheduler tick period
pub const SCHEDULER_TICK: Duration = Duration::from_secs(30);

/// Get the srcadmin home directory
pub fn srcadmin_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(SRCADMIN_DIR))
        .unwrap_or_else(|| PathBuf::from(SRCADMIN_DIR))
}

/// Get the database path
pub fn db_path() -> PathBuf {
    srcadmin_home().join(DB_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srcadmin_home() {
        let home = srcadmin_home();
        assert!(home.to_string_lossy().contains(".srcadmin"));
    }

    #[test]
    fn test_db_path() {
        let path = db_path();
        assert!(path.to_string_lossy().contains("srcadmin.db"));
    }
}
