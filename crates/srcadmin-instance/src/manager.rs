//! Instance manager
//!
//! Owns the maps of process handles and watchdogs, drives the status state
//! machine, and writes every transition through to the store. The in-memory
//! view is authoritative while a process runs. Subscriber callbacks (output
//! lines, status changes) are invoked with no internal locks held.

use parking_lot::RwLock;
use srcadmin_core::{Error, Instance, InstanceStatus, PlaintextCipher, Result, SecretCipher};
use srcadmin_db::Database;
use srcadmin_rcon::RconPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::launch::{build_launch_args, server_exe_path};
use crate::process::ProcessHandle;
use crate::watchdog::Watchdog;

type OutputCallback = Arc<dyn Fn(Uuid, &str) + Send + Sync>;
type StatusCallback = Arc<dyn Fn(Uuid, InstanceStatus) + Send + Sync>;

/// Supervisor for every managed instance.
pub struct InstanceManager {
    db: Database,
    pool: Arc<RconPool>,
    cipher: Arc<dyn SecretCipher>,
    processes: RwLock<HashMap<Uuid, Arc<ProcessHandle>>>,
    watchdogs: RwLock<HashMap<Uuid, Arc<Watchdog>>>,
    on_output: RwLock<OutputCallback>,
    on_status: RwLock<StatusCallback>,
}

impl InstanceManager {
    pub fn new(db: Database, pool: Arc<RconPool>) -> Arc<Self> {
        Self::with_cipher(db, pool, Arc::new(PlaintextCipher))
    }

    pub fn with_cipher(
        db: Database,
        pool: Arc<RconPool>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            pool,
            cipher,
            processes: RwLock::new(HashMap::new()),
            watchdogs: RwLock::new(HashMap::new()),
            on_output: RwLock::new(Arc::new(|_, _| {})),
            on_status: RwLock::new(Arc::new(|_, _| {})),
        })
    }

    /// Subscribe to output lines `(instance_id, line)`.
    pub fn set_on_output<F: Fn(Uuid, &str) + Send + Sync + 'static>(&self, f: F) {
        *self.on_output.write() = Arc::new(f);
    }

    /// Subscribe to status transitions `(instance_id, status)`.
    pub fn set_on_status<F: Fn(Uuid, InstanceStatus) + Send + Sync + 'static>(&self, f: F) {
        *self.on_status.write() = Arc::new(f);
    }

    /// Start an instance: load it, spawn its process, register the watchdog
    /// when auto-restart is enabled.
    pub async fn start(self: &Arc<Self>, instance_id: Uuid) -> Result<()> {
        if self.processes.read().contains_key(&instance_id) {
            return Err(Error::AlreadyRunning(instance_id.to_string()));
        }

        let inst = self
            .db
            .instances()
            .get(instance_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {instance_id}")))?;

        self.update_status(instance_id, InstanceStatus::Starting).await;
        info!(instance = %instance_id, name = %inst.name, "starting instance");

        let proc = self.build_process(&inst)?;

        let watchdog = {
            let mut watchdogs = self.watchdogs.write();
            if inst.auto_restart && !watchdogs.contains_key(&instance_id) {
                let wd = Arc::new(Watchdog::new(instance_id, Arc::downgrade(self)));
                watchdogs.insert(instance_id, Arc::clone(&wd));
                Some(wd)
            } else {
                watchdogs.get(&instance_id).cloned()
            }
        };

        // Register before spawning: the exit callback's removal must always
        // come after this insert, even for a child that dies immediately
        self.processes.write().insert(instance_id, Arc::clone(&proc));

        if let Err(e) = proc.start() {
            self.processes.write().remove(&instance_id);
            self.watchdogs.write().remove(&instance_id);
            self.update_status(instance_id, InstanceStatus::Stopped).await;
            error!(instance = %instance_id, error = %e, "failed to start process");
            return Err(e);
        }

        if let Some(wd) = watchdog {
            wd.set_last_start();
            wd.start();
        }

        self.update_status(instance_id, InstanceStatus::Running).await;
        info!(instance = %instance_id, pid = proc.pid(), "instance started");
        Ok(())
    }

    /// Stop an instance: remove its handle and watchdog, stop gracefully,
    /// and drop the pooled admin-channel client whose socket dies with it.
    pub async fn stop(&self, instance_id: Uuid) -> Result<()> {
        let (proc, watchdog) = {
            let mut processes = self.processes.write();
            let proc = processes.remove(&instance_id);
            let mut watchdogs = self.watchdogs.write();
            let wd = watchdogs.remove(&instance_id);
            (proc, wd)
        };

        if let Some(wd) = watchdog {
            wd.stop();
        }
        self.pool.disconnect(instance_id).await;

        let Some(proc) = proc else {
            self.update_status(instance_id, InstanceStatus::Stopped).await;
            return Ok(());
        };

        self.update_status(instance_id, InstanceStatus::Stopping).await;
        info!(instance = %instance_id, "stopping instance");

        if let Err(e) = proc.stop().await {
            warn!(instance = %instance_id, error = %e, "error during stop");
        }

        self.update_status(instance_id, InstanceStatus::Stopped).await;
        info!(instance = %instance_id, "instance stopped");
        Ok(())
    }

    /// Stop then start.
    pub async fn restart(self: &Arc<Self>, instance_id: Uuid) -> Result<()> {
        self.stop(instance_id).await?;
        self.start(instance_id).await
    }

    /// Delete an instance's row. Refused while a process runs.
    pub async fn delete(&self, instance_id: Uuid) -> Result<()> {
        if self.has_process(instance_id) {
            return Err(Error::InvalidState(format!(
                "instance {instance_id} is running; stop it before deleting"
            )));
        }
        self.watchdogs.write().remove(&instance_id);
        self.db.instances().delete(instance_id).await
    }

    /// Current status: the in-memory view while running, the store otherwise.
    pub async fn get_status(&self, instance_id: Uuid) -> InstanceStatus {
        let running = self
            .processes
            .read()
            .get(&instance_id)
            .map(|p| p.is_running())
            .unwrap_or(false);
        if running {
            return InstanceStatus::Running;
        }

        match self.db.instances().get_status(instance_id).await {
            Ok(Some(status)) => status,
            _ => InstanceStatus::Stopped,
        }
    }

    /// Start every instance flagged auto-start; one failure does not abort
    /// the others.
    pub async fn auto_start_all(self: &Arc<Self>) -> Result<()> {
        let instances = self.db.instances().list_auto_start().await?;
        for inst in instances {
            if let Err(e) = self.start(inst.id).await {
                error!(instance = %inst.id, error = %e, "auto-start failed");
            }
        }
        Ok(())
    }

    /// Stop every running instance (daemon shutdown).
    pub async fn stop_all(&self) {
        let ids: Vec<Uuid> = self.processes.read().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop(id).await {
                warn!(instance = %id, error = %e, "stop failed during shutdown");
            }
        }
    }

    pub fn has_process(&self, instance_id: Uuid) -> bool {
        self.processes.read().contains_key(&instance_id)
    }

    pub fn has_watchdog(&self, instance_id: Uuid) -> bool {
        self.watchdogs.read().contains_key(&instance_id)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn build_process(self: &Arc<Self>, inst: &Instance) -> Result<Arc<ProcessHandle>> {
        let secret = self.cipher.decrypt(&inst.rcon_password)?;
        let exe = server_exe_path(&inst.install_path);
        let args = build_launch_args(inst, &secret);

        let proc = Arc::new(ProcessHandle::new(exe, args));
        let instance_id = inst.id;

        let mgr = Arc::downgrade(self);
        proc.set_on_output(move |line| {
            if let Some(mgr) = mgr.upgrade() {
                let cb = mgr.on_output.read().clone();
                cb(instance_id, line);
            }
        });

        let mgr = Arc::downgrade(self);
        proc.set_on_exit(move |exit_code| {
            if let Some(mgr) = mgr.upgrade() {
                mgr.handle_exit(instance_id, exit_code);
            }
        });

        Ok(proc)
    }

    /// Runs on the reaper task when a child exits, expected or not.
    fn handle_exit(self: Arc<Self>, instance_id: Uuid, exit_code: i32) {
        self.processes.write().remove(&instance_id);
        let watchdog = self.watchdogs.read().get(&instance_id).cloned();

        tokio::spawn(async move {
            // Only an exit that interrupts a running instance is a crash;
            // Stop-initiated teardown already moved the status off `running`
            match self.db.instances().get_status(instance_id).await {
                Ok(Some(InstanceStatus::Running)) => {
                    warn!(instance = %instance_id, exit_code, "instance exited unexpectedly");
                    self.update_status(instance_id, InstanceStatus::Crashed).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(instance = %instance_id, error = %e, "failed to read status on exit")
                }
            }

            if let Some(wd) = watchdog {
                wd.notify_exit(exit_code);
            }
        });
    }

    /// Write-through: store first, then the status callback, no locks held.
    async fn update_status(&self, instance_id: Uuid, status: InstanceStatus) {
        if let Err(e) = self.db.instances().update_status(instance_id, status).await {
            error!(instance = %instance_id, status = %status, error = %e,
                "failed to persist status");
        }

        let cb = self.on_status.read().clone();
        cb(instance_id, status);
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use srcadmin_core::Instance;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup() -> (Arc<InstanceManager>, Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let pool = Arc::new(RconPool::new());
        let manager = InstanceManager::new(db.clone(), pool);
        (manager, db, dir)
    }

    /// Plant a shell script where the server executable is expected.
    fn plant_server_script(install_path: &Path, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let exe = server_exe_path(install_path);
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    async fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_unknown_instance() {
        let (manager, _db, _dir) = setup().await;
        let result = manager.start(Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_start_spawn_failure_leaves_stopped() {
        let (manager, db, dir) = setup().await;
        // No server executable planted under the install root
        let inst = Instance::new("ghost", dir.path().join("missing"), 27015);
        let id = db.instances().insert(&inst).await.unwrap();

        let result = manager.start(id).await;
        assert!(matches!(result, Err(Error::Spawn(_))));
        assert!(!manager.has_process(id));
        assert!(!manager.has_watchdog(id));

        let status = db.instances().get_status(id).await.unwrap().unwrap();
        assert_eq!(status, InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let (manager, db, dir) = setup().await;
        let install = dir.path().join("srv");
        plant_server_script(&install, "read line; exit 0");

        let inst = Instance::new("match", install, 27015).with_auto_restart(false);
        let id = db.instances().insert(&inst).await.unwrap();

        let events: Arc<Mutex<Vec<InstanceStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.set_on_status(move |_, status| sink.lock().push(status));

        manager.start(id).await.unwrap();
        assert!(manager.has_process(id));
        assert!(!manager.has_watchdog(id));

        manager.stop(id).await.unwrap();
        assert!(!manager.has_process(id));

        let observed = events.lock().clone();
        assert_eq!(
            observed,
            vec![
                InstanceStatus::Starting,
                InstanceStatus::Running,
                InstanceStatus::Stopping,
                InstanceStatus::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (manager, db, dir) = setup().await;
        let install = dir.path().join("srv");
        plant_server_script(&install, "read line; exit 0");

        let inst = Instance::new("dup", install, 27016).with_auto_restart(false);
        let id = db.instances().insert(&inst).await.unwrap();

        manager.start(id).await.unwrap();
        assert!(matches!(
            manager.start(id).await,
            Err(Error::AlreadyRunning(_))
        ));
        manager.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_exit_marks_crashed_and_restarts() {
        let (manager, db, dir) = setup().await;
        let install = dir.path().join("srv");
        plant_server_script(&install, "exit 139");

        let inst = Instance::new("crasher", install, 27017);
        let id = db.instances().insert(&inst).await.unwrap();

        let events: Arc<Mutex<Vec<InstanceStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.set_on_status(move |_, status| sink.lock().push(status));

        manager.start(id).await.unwrap();
        assert!(manager.has_watchdog(id));

        // The child dies immediately; the stored status must become crashed
        let mut crashed = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
        while tokio::time::Instant::now() < deadline {
            let status = db.instances().get_status(id).await.unwrap();
            if status == Some(InstanceStatus::Crashed) {
                crashed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(crashed);

        // A second `starting` event proves the watchdog drove a restart
        let restarted = wait_for(
            || {
                events
                    .lock()
                    .iter()
                    .filter(|s| **s == InstanceStatus::Starting)
                    .count()
                    >= 2
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(restarted);

        manager.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_running_refused() {
        let (manager, db, dir) = setup().await;
        let install = dir.path().join("srv");
        plant_server_script(&install, "read line; exit 0");

        let inst = Instance::new("busy", install, 27018).with_auto_restart(false);
        let id = db.instances().insert(&inst).await.unwrap();

        manager.start(id).await.unwrap();
        assert!(matches!(
            manager.delete(id).await,
            Err(Error::InvalidState(_))
        ));

        manager.stop(id).await.unwrap();
        manager.delete(id).await.unwrap();
        assert!(db.instances().get(id).await.unwrap().is_none());
    }
}
