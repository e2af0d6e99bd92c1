//! Auto-restart watchdog
//!
//! One per auto-restart instance. A single background task blocks on either
//! the stop signal or the exit notification; on exit it sleeps the current
//! backoff (interruptible) and asks the manager for a restart. Backoff starts
//! at 1 s, doubles per restart up to 30 s, and resets to 1 s whenever the
//! previous run lasted longer than a minute.

use parking_lot::Mutex;
use srcadmin_core::constants::{BACKOFF_RESET_UPTIME, INITIAL_BACKOFF, MAX_BACKOFF};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::manager::InstanceManager;

struct WatchdogState {
    running: bool,
    backoff: Duration,
    last_start: Option<Instant>,
    exit_rx: Option<mpsc::Receiver<i32>>,
}

/// Restart supervisor for one instance.
pub struct Watchdog {
    instance_id: Uuid,
    manager: Weak<InstanceManager>,
    exit_tx: mpsc::Sender<i32>,
    stop_tx: broadcast::Sender<()>,
    state: Mutex<WatchdogState>,
}

/// Given the current backoff and whether the previous run earned a reset,
/// returns the delay to sleep now and the backoff to carry forward.
fn advance_backoff(current: Duration, run_was_long: bool) -> (Duration, Duration) {
    let delay = if run_was_long { INITIAL_BACKOFF } else { current };
    let next = (delay * 2).min(MAX_BACKOFF);
    (delay, next)
}

impl Watchdog {
    pub fn new(instance_id: Uuid, manager: Weak<InstanceManager>) -> Self {
        // Capacity 1: a process exits at most once per lifetime, so a second
        // pending notification can only be a duplicate and is dropped
        let (exit_tx, exit_rx) = mpsc::channel(1);
        let (stop_tx, _) = broadcast::channel(4);

        Self {
            instance_id,
            manager,
            exit_tx,
            stop_tx,
            state: Mutex::new(WatchdogState {
                running: false,
                backoff: INITIAL_BACKOFF,
                last_start: None,
                exit_rx: Some(exit_rx),
            }),
        }
    }

    /// Record the moment of a successful spawn; used for the backoff reset.
    pub fn set_last_start(&self) {
        self.state.lock().last_start = Some(Instant::now());
    }

    /// Deliver an exit notification without blocking.
    pub fn notify_exit(&self, exit_code: i32) {
        let _ = self.exit_tx.try_send(exit_code);
    }

    /// Start the watchdog loop. Safe to call repeatedly.
    pub fn start(self: &Arc<Self>) {
        let (mut stop_rx, mut exit_rx) = {
            let mut state = self.state.lock();
            if state.running {
                return;
            }
            let Some(exit_rx) = state.exit_rx.take() else {
                return;
            };
            state.running = true;
            (self.stop_tx.subscribe(), exit_rx)
        };

        debug!(instance = %self.instance_id, "watchdog started");

        let wd = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let exit_code = tokio::select! {
                    _ = stop_rx.recv() => break,
                    exit = exit_rx.recv() => match exit {
                        Some(code) => code,
                        None => break,
                    },
                };

                let delay = {
                    let mut state = wd.state.lock();
                    let run_was_long = state
                        .last_start
                        .map(|t| t.elapsed() > BACKOFF_RESET_UPTIME)
                        .unwrap_or(false);
                    let (delay, next) = advance_backoff(state.backoff, run_was_long);
                    state.backoff = next;
                    delay
                };

                info!(
                    instance = %wd.instance_id,
                    exit_code,
                    backoff_secs = delay.as_secs(),
                    "process exited, scheduling restart"
                );

                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = sleep(delay) => {}
                }

                let Some(manager) = wd.manager.upgrade() else { break };
                if !manager.has_watchdog(wd.instance_id) {
                    break;
                }
                if manager.has_process(wd.instance_id) {
                    continue;
                }

                wd.set_last_start();
                if let Err(e) = manager.start(wd.instance_id).await {
                    error!(instance = %wd.instance_id, error = %e, "watchdog restart failed");
                }
            }

            wd.state.lock().running = false;
            debug!(instance = %wd.instance_id, "watchdog stopped");
        });
    }

    /// Signal the loop to stop.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.running = false;
        let _ = self.stop_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}
