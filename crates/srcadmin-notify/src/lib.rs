//! srcadmin notifications
//!
//! Fan-out of server events to pluggable backends. Delivery is best-effort:
//! failures are logged, never propagated into the supervision core.

pub mod alerts;
mod event;
#[cfg(test)]
pub mod mock;
mod webhook;

pub use alerts::{AlertManager, AlertThresholds};
pub use event::ServerEvent;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use tracing::{info, warn};

/// A notification backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &ServerEvent) -> Result<(), String>;
}

/// Writes events to the process log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &ServerEvent) -> Result<(), String> {
        info!(event = event.event_type(), "{}", event.message());
        Ok(())
    }
}

/// Fan-out over every configured backend.
pub struct NotificationManager {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotificationManager {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Log-only manager, always available.
    pub fn log_only() -> Self {
        Self::new(vec![Box::new(LogNotifier)])
    }

    /// Deliver to every backend; failures are logged and swallowed.
    pub async fn notify(&self, event: &ServerEvent) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(event).await {
                warn!(event = event.event_type(), error = %e, "notification failed");
            }
        }
    }
}
