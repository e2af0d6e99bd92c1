//! Notification event types

use serde::Serialize;
use uuid::Uuid;

/// Events higher layers may want to hear about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Started {
        instance_id: Uuid,
        name: String,
    },
    Stopped {
        instance_id: Uuid,
        name: String,
    },
    Crashed {
        instance_id: Uuid,
        name: String,
        exit_code: i32,
    },
    PerformanceAlert {
        instance_id: Uuid,
        breaches: Vec<String>,
        cpu_percent: f64,
        ram_mb: f64,
        tick_rate: f64,
    },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Started { .. } => "started",
            ServerEvent::Stopped { .. } => "stopped",
            ServerEvent::Crashed { .. } => "crashed",
            ServerEvent::PerformanceAlert { .. } => "performance_alert",
        }
    }

    /// Human-readable one-liner for plain-text sinks.
    pub fn message(&self) -> String {
        match self {
            ServerEvent::Started { name, .. } => format!("server '{name}' started"),
            ServerEvent::Stopped { name, .. } => format!("server '{name}' stopped"),
            ServerEvent::Crashed {
                name, exit_code, ..
            } => format!("server '{name}' crashed (exit code {exit_code})"),
            ServerEvent::PerformanceAlert {
                instance_id,
                breaches,
                cpu_percent,
                ram_mb,
                tick_rate,
            } => format!(
                "instance {} breached thresholds: {} (cpu: {:.1}%, ram: {:.0} MiB, tick: {:.1})",
                instance_id,
                breaches.join(", "),
                cpu_percent,
                ram_mb,
                tick_rate
            ),
        }
    }
}
