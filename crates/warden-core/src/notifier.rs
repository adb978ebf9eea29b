//! Periodic metrics notifiers
//!
//! Gauges that cannot be maintained incrementally are sampled on a timer: the
//! live record counts from the store, and the query monitor window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warden_common::{Clock, LockKind, LockResult};
use warden_persistence::{LockStore, QueryMonitor, QuerySnapshot};

use crate::metrics;
use crate::shutdown::{ShutdownSignal, tick_interval};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Reports the number of live locks and presences.
pub struct LockMetricsNotifier {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl LockMetricsNotifier {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval: tick_interval("lock metrics notifier", interval, DEFAULT_REPORT_INTERVAL),
        }
    }

    /// Sample the store once and publish the gauges.
    pub async fn report_once(&self) -> LockResult<(u64, u64)> {
        let now = self.clock.now_millis();
        let locks = self.store.count_live(LockKind::Lock, now).await?;
        let presences = self.store.count_live(LockKind::Presence, now).await?;
        metrics::set_active_counts(locks, presences);
        debug!(locks = locks, presences = presences, "Reported active lock counts");
        Ok((locks, presences))
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.report_once().await {
                        warn!(error = %err, "Failed to sample active lock counts");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!("Lock metrics notifier stopped");
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(self.run(shutdown_rx))
    }
}

/// Reports the query monitor window.
pub struct DbMetricsNotifier {
    monitor: Arc<QueryMonitor>,
    interval: Duration,
}

impl DbMetricsNotifier {
    pub fn new(monitor: Arc<QueryMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval: tick_interval("db metrics notifier", interval, DEFAULT_REPORT_INTERVAL),
        }
    }

    pub fn report_once(&self) -> QuerySnapshot {
        let snapshot = self.monitor.snapshot_and_reset();
        metrics::record_db_snapshot(&snapshot);
        debug!(
            total = snapshot.total,
            failed = snapshot.failed,
            duration_max_ms = snapshot.duration_max.as_millis() as u64,
            in_flight_max = snapshot.in_flight_max,
            "Reported store query metrics"
        );
        snapshot
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.report_once();
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        // Flush the last window.
        self.report_once();
        debug!("DB metrics notifier stopped");
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(self.run(shutdown_rx))
    }
}
