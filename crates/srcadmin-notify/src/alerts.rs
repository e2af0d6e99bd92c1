//! Threshold alerting over collected samples
//!
//! Thresholds are per instance; a breached set alerts at most once per
//! cooldown window so a sustained overload does not flood the sinks.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{NotificationManager, ServerEvent};

const ALERT_COOLDOWN: Duration = Duration::from_secs(300);

/// Performance limits for one instance. A zero field disables that check.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertThresholds {
    pub cpu_percent: f64,
    pub ram_mb: f64,
    pub tick_rate_min: f64,
}

/// Checks samples against thresholds and fans breaches out as alerts.
pub struct AlertManager {
    thresholds: RwLock<HashMap<Uuid, AlertThresholds>>,
    last_alert: Mutex<HashMap<String, Instant>>,
    cooldown: Duration,
    notifier: Arc<NotificationManager>,
}

impl AlertManager {
    pub fn new(notifier: Arc<NotificationManager>) -> Self {
        Self::with_cooldown(notifier, ALERT_COOLDOWN)
    }

    pub fn with_cooldown(notifier: Arc<NotificationManager>, cooldown: Duration) -> Self {
        Self {
            thresholds: RwLock::new(HashMap::new()),
            last_alert: Mutex::new(HashMap::new()),
            cooldown,
            notifier,
        }
    }

    pub fn set_thresholds(&self, instance_id: Uuid, thresholds: AlertThresholds) {
        self.thresholds.write().insert(instance_id, thresholds);
    }

    pub fn clear_thresholds(&self, instance_id: Uuid) {
        self.thresholds.write().remove(&instance_id);
    }

    /// Evaluate one sample's readings. Safe to call from the collector's
    /// sample callback: delivery happens on a spawned task.
    pub fn check(&self, instance_id: Uuid, cpu_percent: f64, ram_mb: f64, tick_rate: f64) {
        let Some(thresholds) = self.thresholds.read().get(&instance_id).copied() else {
            return;
        };

        let mut breaches = Vec::new();
        if thresholds.cpu_percent > 0.0 && cpu_percent >= thresholds.cpu_percent {
            breaches.push("cpu".to_string());
        }
        if thresholds.ram_mb > 0.0 && ram_mb >= thresholds.ram_mb {
            breaches.push("ram".to_string());
        }
        if thresholds.tick_rate_min > 0.0 && tick_rate > 0.0 && tick_rate < thresholds.tick_rate_min
        {
            breaches.push("tick_rate".to_string());
        }

        if breaches.is_empty() {
            return;
        }

        let key = format!("{instance_id}:{}", breaches.join(","));
        {
            let mut last_alert = self.last_alert.lock();
            if let Some(last) = last_alert.get(&key) {
                if last.elapsed() < self.cooldown {
                    return;
                }
            }
            last_alert.insert(key, Instant::now());
        }

        let event = ServerEvent::PerformanceAlert {
            instance_id,
            breaches,
            cpu_percent,
            ram_mb,
            tick_rate,
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move { notifier.notify(&event).await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNotifier;

    fn manager_with_mock(cooldown: Duration) -> (AlertManager, Arc<MockNotifier>) {
        let mock = Arc::new(MockNotifier::default());
        let notifier = Arc::new(NotificationManager::new(vec![Box::new(Arc::clone(&mock))]));
        (AlertManager::with_cooldown(notifier, cooldown), mock)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_no_thresholds_no_alert() {
        let (alerts, mock) = manager_with_mock(Duration::from_secs(1));
        alerts.check(Uuid::new_v4(), 99.0, 99999.0, 1.0);
        settle().await;
        assert_eq!(mock.count(), 0);
    }

    #[tokio::test]
    async fn test_breach_fires_alert() {
        let (alerts, mock) = manager_with_mock(Duration::from_secs(60));
        let id = Uuid::new_v4();
        alerts.set_thresholds(
            id,
            AlertThresholds {
                cpu_percent: 90.0,
                ram_mb: 0.0,
                tick_rate_min: 32.0,
            },
        );

        alerts.check(id, 95.0, 2048.0, 20.0);
        settle().await;
        assert_eq!(mock.count(), 1);
        let message = mock.messages().pop().unwrap();
        assert!(message.contains("cpu"));
        assert!(message.contains("tick_rate"));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat() {
        let (alerts, mock) = manager_with_mock(Duration::from_secs(60));
        let id = Uuid::new_v4();
        alerts.set_thresholds(
            id,
            AlertThresholds {
                cpu_percent: 50.0,
                ..Default::default()
            },
        );

        alerts.check(id, 80.0, 0.0, 0.0);
        alerts.check(id, 85.0, 0.0, 0.0);
        settle().await;
        assert_eq!(mock.count(), 1);
    }

    #[tokio::test]
    async fn test_within_limits_no_alert() {
        let (alerts, mock) = manager_with_mock(Duration::from_secs(1));
        let id = Uuid::new_v4();
        alerts.set_thresholds(
            id,
            AlertThresholds {
                cpu_percent: 90.0,
                ram_mb: 8192.0,
                tick_rate_min: 32.0,
            },
        );

        // Tick rate 0 means "no reading", not a breach
        alerts.check(id, 40.0, 2048.0, 0.0);
        settle().await;
        assert_eq!(mock.count(), 0);
    }
}
