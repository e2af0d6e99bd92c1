//! srcadmin telemetry collector
//!
//! One collector per instance, sampling at 1 Hz: host CPU averaged across
//! cores over a 500 ms window, host RAM, host-wide network counter deltas,
//! and tick rate / player count parsed from the admin channel's `status`
//! output. Each sample is appended to the store and handed to the subscriber
//! callback.

pub mod status;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use srcadmin_core::constants::{CPU_SAMPLE_WINDOW, SAMPLE_INTERVAL};
use srcadmin_core::{Result, Sample};
use srcadmin_db::Database;
use srcadmin_rcon::RconPool;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Networks, System};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use status::parse_status;

/// One tick's worth of host and in-game readings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    pub cpu_percent: f64,
    pub ram_mb: f64,
    pub tick_rate: f64,
    pub players: i64,
    pub net_in_kbps: f64,
    pub net_out_kbps: f64,
}

type SampleCallback = Arc<dyn Fn(Uuid, &Metrics) + Send + Sync>;

/// Periodic sampler for one instance.
pub struct Collector {
    instance_id: Uuid,
    rcon_addr: String,
    rcon_password: String,
    db: Database,
    pool: Arc<RconPool>,
    on_sample: RwLock<SampleCallback>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Collector {
    pub fn new(
        instance_id: Uuid,
        rcon_addr: impl Into<String>,
        rcon_password: impl Into<String>,
        db: Database,
        pool: Arc<RconPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            instance_id,
            rcon_addr: rcon_addr.into(),
            rcon_password: rcon_password.into(),
            db,
            pool,
            on_sample: RwLock::new(Arc::new(|_, _| {})),
            stop_tx: Mutex::new(None),
        })
    }

    /// Subscribe to collected samples.
    pub fn set_on_sample<F: Fn(Uuid, &Metrics) + Send + Sync + 'static>(&self, f: F) {
        *self.on_sample.write() = Arc::new(f);
    }

    /// Start the sampling loop. Idempotent. Dials the admin channel
    /// best-effort; on failure sampling continues with zeroed game fields.
    /// Calling again on a running collector retries the dial.
    pub async fn start(self: &Arc<Self>) {
        let started = {
            let mut stop_tx = self.stop_tx.lock();
            if stop_tx.is_some() {
                false
            } else {
                let (tx, rx) = watch::channel(false);
                *stop_tx = Some(tx);

                let collector = Arc::clone(self);
                tokio::spawn(async move { collector.run(rx).await });
                true
            }
        };

        self.connect_rcon().await;

        if started {
            info!(instance = %self.instance_id, "collector started");
        }
    }

    /// Best-effort admin-channel dial; a no-op when already pooled.
    pub async fn connect_rcon(&self) {
        if self.pool.get(self.instance_id).is_none() {
            if let Err(e) = self
                .pool
                .connect(self.instance_id, &*self.rcon_addr, &*self.rcon_password)
                .await
            {
                warn!(instance = %self.instance_id, error = %e,
                    "rcon not connected, game metrics will be 0");
            }
        }
    }

    /// Stop the sampling loop. Idempotent; never blocks on the network.
    pub fn stop(&self) {
        let sender = self.stop_tx.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
            info!(instance = %self.instance_id, "collector stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().is_some()
    }

    /// Samples for this instance from the last `window`, ascending.
    pub async fn history(&self, window: Duration) -> Result<Vec<Sample>> {
        let since = Utc::now()
            - chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.db.samples().history(self.instance_id, since).await
    }

    async fn run(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut sys = System::new();
        let mut networks = Networks::new_with_refreshed_list();
        // (total received, total transmitted, read at); first tick has no
        // previous counters, so its delta is discarded
        let mut prev_net: Option<(u64, u64, Instant)> = None;

        let mut ticker = interval(SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                _ = ticker.tick() => {
                    self.collect_once(&mut sys, &mut networks, &mut prev_net).await;
                }
            }
        }
    }

    async fn collect_once(
        &self,
        sys: &mut System,
        networks: &mut Networks,
        prev_net: &mut Option<(u64, u64, Instant)>,
    ) {
        let mut metrics = Metrics::default();

        // CPU averaged across cores over the sampling window
        sys.refresh_cpu_usage();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        sys.refresh_cpu_usage();
        let cpus = sys.cpus();
        if !cpus.is_empty() {
            let total: f64 = cpus.iter().map(|c| c.cpu_usage() as f64).sum();
            metrics.cpu_percent = total / cpus.len() as f64;
        }

        sys.refresh_memory();
        metrics.ram_mb = sys.used_memory() as f64 / (1024.0 * 1024.0);

        // Host-wide counters; traffic cannot be attributed per process
        networks.refresh();
        let mut recv: u64 = 0;
        let mut sent: u64 = 0;
        for (_, data) in networks.iter() {
            recv += data.total_received();
            sent += data.total_transmitted();
        }
        let now = Instant::now();
        if let Some((prev_recv, prev_sent, prev_at)) = *prev_net {
            let elapsed = now.duration_since(prev_at).as_secs_f64();
            if elapsed > 0.0 {
                metrics.net_in_kbps = recv.saturating_sub(prev_recv) as f64 / 1024.0 / elapsed;
                metrics.net_out_kbps = sent.saturating_sub(prev_sent) as f64 / 1024.0 / elapsed;
            }
        }
        *prev_net = Some((recv, sent, now));

        // In-game counters through the admin channel, when connected
        if self.pool.get(self.instance_id).is_some() {
            match self.pool.execute(self.instance_id, "status").await {
                Ok(out) if !out.is_empty() => {
                    let (tick_rate, players) = parse_status(&out);
                    metrics.tick_rate = tick_rate;
                    metrics.players = players;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(instance = %self.instance_id, error = %e, "status query failed");
                }
            }
        }

        let sample = Sample {
            id: 0,
            instance_id: self.instance_id,
            timestamp: Utc::now(),
            cpu_percent: metrics.cpu_percent,
            ram_mb: metrics.ram_mb,
            tick_rate: metrics.tick_rate,
            players: metrics.players,
            net_in_kbps: metrics.net_in_kbps,
            net_out_kbps: metrics.net_out_kbps,
        };
        // Append-only series; a failed insert is dropped, not retried
        if let Err(e) = self.db.samples().insert(&sample).await {
            debug!(instance = %self.instance_id, error = %e, "failed to store sample");
        }

        let cb = self.on_sample.read().clone();
        cb(self.instance_id, &metrics);
    }
}
