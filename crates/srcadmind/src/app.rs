//! Daemon wiring
//!
//! Builds the supervision stack and connects the pieces: status changes
//! start and stop collectors, samples feed the alert thresholds, scheduler
//! actions are translated into manager/pool calls.

use parking_lot::Mutex;
use srcadmin_core::{PlaintextCipher, Result, SecretCipher, TaskAction};
use srcadmin_db::Database;
use srcadmin_instance::InstanceManager;
use srcadmin_monitor::Collector;
use srcadmin_notify::{AlertManager, NotificationManager, ServerEvent, WebhookNotifier};
use srcadmin_rcon::RconPool;
use srcadmin_scheduler::Scheduler;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The assembled control plane.
pub struct App {
    db: Database,
    pool: Arc<RconPool>,
    pub manager: Arc<InstanceManager>,
    pub scheduler: Arc<Scheduler>,
    alerts: Arc<AlertManager>,
    notifier: Arc<NotificationManager>,
    cipher: Arc<dyn SecretCipher>,
    collectors: Arc<Mutex<HashMap<Uuid, Arc<Collector>>>>,
}

impl App {
    pub fn new(db: Database) -> Arc<Self> {
        let pool = Arc::new(RconPool::new());
        let cipher: Arc<dyn SecretCipher> = Arc::new(PlaintextCipher);
        let manager =
            InstanceManager::with_cipher(db.clone(), Arc::clone(&pool), Arc::clone(&cipher));
        let scheduler = Scheduler::new(db.clone());

        let mut notifiers: Vec<Box<dyn srcadmin_notify::Notifier>> =
            vec![Box::new(srcadmin_notify::LogNotifier)];
        if let Ok(url) = std::env::var("SRCADMIN_WEBHOOK_URL") {
            if !url.is_empty() {
                info!(url = %url, "webhook notifications enabled");
                notifiers.push(Box::new(WebhookNotifier::new(url)));
            }
        }
        let notifier = Arc::new(NotificationManager::new(notifiers));
        let alerts = Arc::new(AlertManager::new(Arc::clone(&notifier)));

        let app = Arc::new(Self {
            db,
            pool,
            manager,
            scheduler,
            alerts,
            notifier,
            cipher,
            collectors: Arc::new(Mutex::new(HashMap::new())),
        });
        app.wire();
        app
    }

    /// Connect callbacks between the components.
    fn wire(self: &Arc<Self>) {
        // Server console lines; a UI collaborator would subscribe here
        self.manager.set_on_output(|instance_id, line| {
            debug!(instance = %instance_id, "{}", line);
        });

        let app = Arc::downgrade(self);
        self.manager.set_on_status(move |instance_id, status| {
            let Some(app) = app.upgrade() else { return };
            tokio::spawn(async move {
                app.on_status_change(instance_id, status).await;
            });
        });

        let app = Arc::downgrade(self);
        self.scheduler.set_on_action(move |instance_id, action, payload| {
            let Some(app) = app.upgrade() else { return };
            let payload = payload.to_string();
            tokio::spawn(async move {
                app.dispatch_action(instance_id, action, payload).await;
            });
        });
    }

    /// Bring the daemon up: scheduler loop, then auto-start instances.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.scheduler.start().await?;
        self.manager.auto_start_all().await?;
        info!("srcadmin daemon running");
        Ok(())
    }

    /// Tear everything down in dependency order.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.scheduler.stop();

        let collectors: Vec<Arc<Collector>> =
            self.collectors.lock().drain().map(|(_, c)| c).collect();
        for collector in collectors {
            collector.stop();
        }

        self.manager.stop_all().await;
        self.pool.disconnect_all().await;
        self.db.close().await;
        info!("shutdown complete");
    }

    async fn on_status_change(
        self: &Arc<Self>,
        instance_id: Uuid,
        status: srcadmin_core::InstanceStatus,
    ) {
        use srcadmin_core::InstanceStatus::*;

        match status {
            Running => self.ensure_collector(instance_id).await,
            Stopped => {
                if let Some(collector) = self.collectors.lock().remove(&instance_id) {
                    collector.stop();
                }
            }
            Crashed => {
                // Collector keeps sampling with zeroed game fields until the
                // watchdog brings the server back
                let name = match self.db.instances().get(instance_id).await {
                    Ok(Some(inst)) => inst.name,
                    _ => instance_id.to_string(),
                };
                self.notifier
                    .notify(&ServerEvent::Crashed {
                        instance_id,
                        name,
                        exit_code: -1,
                    })
                    .await;
            }
            _ => {}
        }
    }

    async fn ensure_collector(self: &Arc<Self>, instance_id: Uuid) {
        let inst = match self.db.instances().get(instance_id).await {
            Ok(Some(inst)) => inst,
            Ok(None) => return,
            Err(e) => {
                error!(instance = %instance_id, error = %e, "failed to load instance");
                return;
            }
        };

        let secret = match self.cipher.decrypt(&inst.rcon_password) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(instance = %instance_id, error = %e, "failed to unseal admin secret");
                String::new()
            }
        };

        let collector = {
            let mut collectors = self.collectors.lock();
            Arc::clone(collectors.entry(instance_id).or_insert_with(|| {
                Collector::new(
                    instance_id,
                    inst.rcon_addr(),
                    secret,
                    self.db.clone(),
                    Arc::clone(&self.pool),
                )
            }))
        };

        let alerts = Arc::clone(&self.alerts);
        collector.set_on_sample(move |id, metrics| {
            alerts.check(id, metrics.cpu_percent, metrics.ram_mb, metrics.tick_rate);
        });

        collector.start().await;
    }

    /// Run one benchmark sweep against a connected instance.
    pub async fn run_benchmark(
        &self,
        config: srcadmin_bench::BenchmarkConfig,
    ) -> Result<srcadmin_core::BenchmarkResult> {
        let runner = srcadmin_bench::BenchmarkRunner::new(
            config,
            self.db.clone(),
            Arc::clone(&self.pool),
        );
        runner.run().await
    }

    async fn dispatch_action(self: &Arc<Self>, instance_id: Uuid, action: TaskAction, payload: String) {
        let result = match action {
            TaskAction::Restart => self.manager.restart(instance_id).await,
            TaskAction::Command => self
                .pool
                .execute(instance_id, &payload)
                .await
                .map(|out| debug!(instance = %instance_id, "{}", out)),
            TaskAction::MapChange => self
                .pool
                .execute(instance_id, &format!("changelevel {payload}"))
                .await
                .map(|_| ()),
            TaskAction::Update | TaskAction::Backup => {
                // Installers and archivers are external collaborators
                info!(instance = %instance_id, action = %action,
                    "action delegated to external handler");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(instance = %instance_id, action = %action, error = %e,
                "scheduled action failed");
        }
    }
}
