//! Core types for srcadmin

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::DEFAULT_MAX_PLAYERS;
use crate::error::{Error, Result};

/// Lifecycle status of a server instance.
///
/// `Installing` and `Updating` are driven by the installer collaborator; the
/// manager persists them but never transitions into or out of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Installing,
    Updating,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Crashed => "crashed",
            InstanceStatus::Installing => "installing",
            InstanceStatus::Updating => "updating",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(InstanceStatus::Stopped),
            "starting" => Ok(InstanceStatus::Starting),
            "running" => Ok(InstanceStatus::Running),
            "stopping" => Ok(InstanceStatus::Stopping),
            "crashed" => Ok(InstanceStatus::Crashed),
            "installing" => Ok(InstanceStatus::Installing),
            "updating" => Ok(InstanceStatus::Updating),
            _ => Err(Error::InvalidState(format!("unknown status: {s}"))),
        }
    }
}

/// One managed dedicated-server install and its launch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    /// Filesystem root of the server install
    pub install_path: PathBuf,
    /// Game port; the admin channel listens on the same port
    pub port: u16,
    pub max_players: u32,
    /// Free-form mode name mapped to game_mode/game_type at launch
    pub game_mode: String,
    pub current_map: String,
    /// Extra launch arguments, whitespace-separated
    pub launch_args: String,
    /// Admin-channel secret, encrypted at rest
    #[serde(skip_serializing)]
    pub rcon_password: String,
    pub auto_restart: bool,
    pub auto_start: bool,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(name: impl Into<String>, install_path: PathBuf, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            name: name.into(),
            install_path,
            port,
            max_players: DEFAULT_MAX_PLAYERS,
            game_mode: "competitive".to_string(),
            current_map: String::new(),
            launch_args: String::new(),
            rcon_password: String::new(),
            auto_restart: true,
            auto_start: false,
            status: InstanceStatus::Stopped,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_game_mode(mut self, mode: impl Into<String>) -> Self {
        self.game_mode = mode.into();
        self
    }

    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.current_map = map.into();
        self
    }

    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn with_rcon_password(mut self, password: impl Into<String>) -> Self {
        self.rcon_password = password.into();
        self
    }

    pub fn with_launch_args(mut self, args: impl Into<String>) -> Self {
        self.launch_args = args.into();
        self
    }

    pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Admin-channel address on the loopback interface.
    pub fn rcon_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// Kind of action a scheduled task dispatches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Restart,
    Update,
    Backup,
    Command,
    MapChange,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Restart => "restart",
            TaskAction::Update => "update",
            TaskAction::Backup => "backup",
            TaskAction::Command => "command",
            TaskAction::MapChange => "map_change",
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restart" => Ok(TaskAction::Restart),
            "update" => Ok(TaskAction::Update),
            "backup" => Ok(TaskAction::Backup),
            "command" => Ok(TaskAction::Command),
            "map_change" => Ok(TaskAction::MapChange),
            _ => Err(Error::InvalidConfig(format!("unknown action: {s}"))),
        }
    }
}

/// One scheduled action targeting one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub instance_id: Uuid,
    /// Reduced five-field calendar expression: `min hour day month dow`
    pub cron_expr: String,
    pub action: TaskAction,
    pub payload: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        instance_id: Uuid,
        cron_expr: impl Into<String>,
        action: TaskAction,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            instance_id,
            cron_expr: cron_expr.into(),
            action,
            payload: payload.into(),
            enabled: true,
            last_run: None,
            next_run: None,
            created_at: Utc::now(),
        }
    }
}

/// One row of the telemetry time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub ram_mb: f64,
    pub tick_rate: f64,
    pub players: i64,
    pub net_in_kbps: f64,
    pub net_out_kbps: f64,
}

/// Aggregate persisted at the end of a benchmark sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub bot_count: u32,
    pub avg_tickrate: f64,
    pub min_tickrate: f64,
    /// Always 0: `status` does not report frametime
    pub avg_frametime: f64,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub duration_sec: u32,
    pub created_at: DateTime<Utc>,
}

/// One ban on a server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanEntry {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub steam_id: String,
    pub ip_address: String,
    pub reason: String,
    /// None for permanent bans
    pub expires_at: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            InstanceStatus::Stopped,
            InstanceStatus::Starting,
            InstanceStatus::Running,
            InstanceStatus::Stopping,
            InstanceStatus::Crashed,
            InstanceStatus::Installing,
            InstanceStatus::Updating,
        ] {
            let parsed: InstanceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_task_action_round_trip() {
        for action in [
            TaskAction::Restart,
            TaskAction::Update,
            TaskAction::Backup,
            TaskAction::Command,
            TaskAction::MapChange,
        ] {
            let parsed: TaskAction = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert!("reboot".parse::<TaskAction>().is_err());
    }

    #[test]
    fn test_instance_builder() {
        let inst = Instance::new("match-server", PathBuf::from("/srv/cs2"), 27015)
            .with_game_mode("wingman")
            .with_max_players(4)
            .with_auto_start(true);

        assert_eq!(inst.name, "match-server");
        assert_eq!(inst.port, 27015);
        assert_eq!(inst.game_mode, "wingman");
        assert_eq!(inst.max_players, 4);
        assert!(inst.auto_start);
        assert!(inst.auto_restart);
        assert_eq!(inst.status, InstanceStatus::Stopped);
        assert_eq!(inst.rcon_addr(), "127.0.0.1:27015");
    }
}
