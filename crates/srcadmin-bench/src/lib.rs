//! srcadmin benchmark runner
//!
//! Deterministic load sweep: bots are injected in steps through the admin
//! channel, host CPU/RAM and tick rate are sampled at 500 ms cadence for the
//! step duration, and one aggregate row is persisted at the end. Cancellation
//! is cooperative, observed at the top of each step and between samples.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use srcadmin_core::{BenchmarkResult, Error, Result};
use srcadmin_db::Database;
use srcadmin_monitor::parse_status;
use srcadmin_rcon::RconPool;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// How long bots get to spawn in after each quota change
const BOT_SETTLE: Duration = Duration::from_secs(2);

/// Sampling cadence within a step
const SAMPLE_CADENCE: Duration = Duration::from_millis(500);

/// Parameters of one benchmark sweep.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub instance_id: Uuid,
    pub max_bots: u32,
    pub step_size: u32,
    pub step_duration: Duration,
}

impl BenchmarkConfig {
    fn validate(&self) -> Result<()> {
        if self.max_bots == 0 || self.step_size == 0 {
            return Err(Error::invalid_config(format!(
                "max_bots={} step_size={}",
                self.max_bots, self.step_size
            )));
        }
        if self.step_duration < Duration::from_secs(1) {
            return Err(Error::invalid_config("step_duration must be at least 1s"));
        }
        Ok(())
    }

    fn total_steps(&self) -> u32 {
        self.max_bots.div_ceil(self.step_size)
    }
}

/// Readings aggregated over one step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub bot_count: u32,
    pub avg_tickrate: f64,
    pub min_tickrate: f64,
    pub cpu_usage: f64,
    pub ram_usage: f64,
}

type ProgressCallback = Arc<dyn Fn(u32, u32, &StepMetrics) + Send + Sync>;

/// Executes one benchmark sweep against a running instance.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    db: Database,
    pool: Arc<RconPool>,
    on_progress: RwLock<ProgressCallback>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig, db: Database, pool: Arc<RconPool>) -> Self {
        Self {
            config,
            db,
            pool,
            on_progress: RwLock::new(Arc::new(|_, _, _| {})),
            stop_tx: Mutex::new(None),
        }
    }

    /// Callback invoked after each step: `(step, total_steps, metrics)`.
    pub fn set_on_progress<F: Fn(u32, u32, &StepMetrics) + Send + Sync + 'static>(&self, f: F) {
        *self.on_progress.write() = Arc::new(f);
    }

    /// Cancel an in-progress run.
    pub fn stop(&self) {
        if let Some(sender) = self.stop_tx.lock().take() {
            let _ = sender.send(true);
        }
    }

    /// Run the sweep to completion and persist the aggregate.
    pub async fn run(&self) -> Result<BenchmarkResult> {
        self.config.validate()?;

        let rx = {
            let mut stop_tx = self.stop_tx.lock();
            if stop_tx.is_some() {
                return Err(Error::InvalidState("benchmark already running".to_string()));
            }
            let (tx, rx) = watch::channel(false);
            *stop_tx = Some(tx);
            rx
        };

        let result = self.run_sweep(rx).await;
        self.stop_tx.lock().take();
        result
    }

    async fn run_sweep(&self, stop_rx: watch::Receiver<bool>) -> Result<BenchmarkResult> {
        let total_steps = self.config.total_steps();
        let instance_id = self.config.instance_id;

        info!(instance = %instance_id, max_bots = self.config.max_bots,
            steps = total_steps, "benchmark starting");

        let mut sys = System::new();
        let mut step_ticks = Vec::new();
        let mut step_cpus = Vec::new();
        let mut step_rams = Vec::new();

        for step in 1..=total_steps {
            if *stop_rx.borrow() {
                return Err(Error::Stopped);
            }

            let bot_count = (step * self.config.step_size).min(self.config.max_bots);

            if self.pool.get(instance_id).is_some() {
                let cmd = format!("bot_quota {bot_count}");
                if let Err(e) = self.pool.execute(instance_id, &cmd).await {
                    debug!(instance = %instance_id, error = %e, "bot_quota failed");
                }
                sleep(BOT_SETTLE).await;
            }

            let mut ticks = Vec::new();
            let mut cpus = Vec::new();
            let mut rams = Vec::new();
            let deadline = Instant::now() + self.config.step_duration;

            while Instant::now() < deadline {
                if *stop_rx.borrow() {
                    return Err(Error::Stopped);
                }

                // The CPU reading doubles as the cadence delay
                sys.refresh_cpu_usage();
                sleep(SAMPLE_CADENCE).await;
                sys.refresh_cpu_usage();
                let host_cpus = sys.cpus();
                if !host_cpus.is_empty() {
                    let total: f64 = host_cpus.iter().map(|c| c.cpu_usage() as f64).sum();
                    cpus.push(total / host_cpus.len() as f64);
                }

                sys.refresh_memory();
                rams.push(sys.used_memory() as f64 / (1024.0 * 1024.0));

                if self.pool.get(instance_id).is_some() {
                    if let Ok(out) = self.pool.execute(instance_id, "status").await {
                        if !out.is_empty() {
                            let (tick_rate, _) = parse_status(&out);
                            ticks.push(tick_rate);
                        }
                    }
                }
            }

            let (avg_tick, min_tick) = avg_and_min(&ticks);
            let avg_cpu = avg(&cpus);
            let avg_ram = avg(&rams);

            step_ticks.push(avg_tick);
            step_cpus.push(avg_cpu);
            step_rams.push(avg_ram);

            let metrics = StepMetrics {
                bot_count,
                avg_tickrate: avg_tick,
                min_tickrate: min_tick,
                cpu_usage: avg_cpu,
                ram_usage: avg_ram,
            };

            let cb = self.on_progress.read().clone();
            cb(step, total_steps, &metrics);
        }

        if self.pool.get(instance_id).is_some() {
            if let Err(e) = self.pool.execute(instance_id, "bot_quota 0").await {
                debug!(instance = %instance_id, error = %e, "bot_quota reset failed");
            }
        }

        let (avg_tick, min_tick) = avg_and_min(&step_ticks);
        let mut result = BenchmarkResult {
            id: Uuid::nil(),
            instance_id,
            bot_count: self.config.max_bots,
            avg_tickrate: avg_tick,
            min_tickrate: min_tick,
            // Not reported by `status`; no estimate is fabricated
            avg_frametime: 0.0,
            cpu_usage: avg(&step_cpus),
            ram_usage: avg(&step_rams),
            duration_sec: self.config.step_duration.as_secs() as u32 * total_steps,
            created_at: Utc::now(),
        };

        result.id = self.db.benchmarks().insert(&result).await?;

        info!(instance = %instance_id, bots = self.config.max_bots,
            avg_tick = result.avg_tickrate, "benchmark completed");
        Ok(result)
    }
}

fn avg(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn avg_and_min(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    (avg(values), min)
}
