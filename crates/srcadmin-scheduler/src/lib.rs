//! srcadmin task scheduler
//!
//! A 30-second tick walks the in-memory task table; every enabled task whose
//! next-run has arrived gets dispatched through the action callback, with
//! last-run/next-run updated both in memory and in the store. The callback
//! is invoked with no internal locks held.

pub mod cron;

use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use srcadmin_core::constants::SCHEDULER_TICK;
use srcadmin_core::{Result, Task, TaskAction};
use srcadmin_db::Database;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

struct ScheduledEntry {
    task: Task,
    next_run: DateTime<Local>,
}

type ActionCallback = Arc<dyn Fn(Uuid, TaskAction, &str) + Send + Sync>;

/// Calendar-driven dispatcher for per-instance actions.
pub struct Scheduler {
    db: Database,
    tasks: Mutex<HashMap<Uuid, ScheduledEntry>>,
    on_action: RwLock<ActionCallback>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            tasks: Mutex::new(HashMap::new()),
            on_action: RwLock::new(Arc::new(|_, _, _| {})),
            stop_tx: Mutex::new(None),
        })
    }

    /// Callback invoked when a task is due: `(instance_id, action, payload)`.
    pub fn set_on_action<F: Fn(Uuid, TaskAction, &str) + Send + Sync + 'static>(&self, f: F) {
        *self.on_action.write() = Arc::new(f);
    }

    /// Load enabled tasks from the store and start the tick loop. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.stop_tx.lock().is_some() {
            return Ok(());
        }

        let stored = self.db.tasks().list_enabled().await?;
        let now = Local::now();
        {
            let mut tasks = self.tasks.lock();
            for task in stored {
                match cron::next_run(&task.cron_expr, now) {
                    Ok(next_run) => {
                        tasks.insert(task.id, ScheduledEntry { task, next_run });
                    }
                    Err(e) => {
                        warn!(task = %task.id, cron = %task.cron_expr, error = %e,
                            "skipping task with invalid expression");
                    }
                }
            }
            info!(tasks = tasks.len(), "scheduler started");
        }

        let (tx, mut rx) = watch::channel(false);
        *self.stop_tx.lock() = Some(tx);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(SCHEDULER_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The interval fires immediately once; skip that first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = rx.changed() => return,
                    _ = ticker.tick() => scheduler.check_and_run().await,
                }
            }
        });

        Ok(())
    }

    /// Stop the tick loop. Idempotent; never blocks on the network.
    pub fn stop(&self) {
        let sender = self.stop_tx.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
            info!("scheduler stopped");
        }
    }

    /// Validate, persist, and register a task. Returns its id.
    pub async fn add_task(&self, mut task: Task) -> Result<Uuid> {
        let next_run = cron::next_run(&task.cron_expr, Local::now())?;

        task.enabled = true;
        task.next_run = Some(next_run.with_timezone(&Utc));
        let id = self.db.tasks().insert(&task).await?;
        task.id = id;

        self.tasks
            .lock()
            .insert(id, ScheduledEntry { task, next_run });
        Ok(id)
    }

    /// Drop a task from the table and the store.
    pub async fn remove_task(&self, task_id: Uuid) -> Result<()> {
        self.tasks.lock().remove(&task_id);
        self.db.tasks().delete(task_id).await
    }

    /// Tasks for one instance, straight from the store.
    pub async fn list_tasks(&self, instance_id: Uuid) -> Result<Vec<Task>> {
        self.db.tasks().list_by_instance(instance_id).await
    }

    async fn check_and_run(&self) {
        let now = Local::now();

        // Collect due tasks and advance their run times under the lock,
        // then persist and dispatch with the lock released
        let due: Vec<(Task, DateTime<Utc>)> = {
            let mut tasks = self.tasks.lock();
            let mut due = Vec::new();
            for entry in tasks.values_mut() {
                if !entry.task.enabled || entry.next_run > now {
                    continue;
                }

                let next_run = cron::next_run(&entry.task.cron_expr, now)
                    .unwrap_or_else(|_| now + chrono::Duration::hours(24));
                entry.next_run = next_run;
                entry.task.last_run = Some(now.with_timezone(&Utc));
                entry.task.next_run = Some(next_run.with_timezone(&Utc));
                due.push((entry.task.clone(), next_run.with_timezone(&Utc)));
            }
            due
        };

        for (task, next_run) in due {
            if let Err(e) = self
                .db
                .tasks()
                .update_run_times(task.id, now.with_timezone(&Utc), next_run)
                .await
            {
                warn!(task = %task.id, error = %e, "failed to persist run times");
            }

            info!(task = %task.id, instance = %task.instance_id, action = %task.action,
                "dispatching scheduled action");
            let cb = self.on_action.read().clone();
            cb(task.instance_id, task.action, &task.payload);
        }
    }

    #[cfg(test)]
    fn force_next_run(&self, task_id: Uuid, when: DateTime<Local>) {
        if let Some(entry) = self.tasks.lock().get_mut(&task_id) {
            entry.next_run = when;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcadmin_core::Instance;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> (Arc<Scheduler>, Database, Uuid, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let inst = Instance::new("sched", PathBuf::from("/srv/sched"), 27015);
        let instance_id = db.instances().insert(&inst).await.unwrap();
        let scheduler = Scheduler::new(db.clone());
        (scheduler, db, instance_id, dir)
    }

    #[tokio::test]
    async fn test_add_task_validates_expression() {
        let (scheduler, _db, instance_id, _dir) = setup().await;

        let bad = Task::new(instance_id, "61 2 * * *", TaskAction::Restart, "");
        assert!(scheduler.add_task(bad).await.is_err());

        let good = Task::new(instance_id, "30 2 * * *", TaskAction::Restart, "");
        let id = scheduler.add_task(good).await.unwrap();
        assert!(!id.is_nil());

        let tasks = scheduler.list_tasks(instance_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].next_run.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_due_task_dispatched_once() {
        let (scheduler, db, instance_id, _dir) = setup().await;

        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        scheduler.set_on_action(move |id, action, payload| {
            assert_eq!(id, instance_id);
            assert_eq!(action, TaskAction::Command);
            assert_eq!(payload, "say scheduled");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let task = Task::new(instance_id, "30 2 * * *", TaskAction::Command, "say scheduled");
        let id = scheduler.add_task(task).await.unwrap();

        // Not yet due
        scheduler.check_and_run().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Pull the fire time into the past
        scheduler.force_next_run(id, Local::now() - chrono::Duration::minutes(1));
        scheduler.check_and_run().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Re-armed for the future: a second pass must not fire again
        scheduler.check_and_run().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let stored = db.tasks().get(id).await.unwrap().unwrap();
        assert!(stored.last_run.is_some());
        assert!(stored.next_run.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_remove_task() {
        let (scheduler, db, instance_id, _dir) = setup().await;

        let task = Task::new(instance_id, "0 3 * * *", TaskAction::Backup, "");
        let id = scheduler.add_task(task).await.unwrap();

        scheduler.remove_task(id).await.unwrap();
        assert!(db.tasks().get(id).await.unwrap().is_none());
        assert!(scheduler.list_tasks(instance_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_loads_enabled_tasks() {
        let (scheduler, db, instance_id, _dir) = setup().await;

        let task = Task::new(instance_id, "15 4 * * *", TaskAction::Restart, "");
        db.tasks().insert(&task).await.unwrap();

        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap(); // idempotent
        assert_eq!(scheduler.tasks.lock().len(), 1);
        scheduler.stop();
        scheduler.stop();
    }
}
