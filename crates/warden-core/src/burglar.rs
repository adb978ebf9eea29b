//! Burglar - background task that reclaims expired locks
//!
//! Each cycle is one bulk conditional delete evaluated by the store against
//! the deadline at execution time. A renewal committed before the delete runs
//! moved its deadline and is not matched, so a healthy owner is never evicted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_common::{Clock, LockError, LockResult};
use warden_persistence::LockStore;

use crate::fatal::FatalSignal;
use crate::metrics;
use crate::shutdown::{ShutdownSignal, tick_interval};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Background sweeper of expired records
pub struct Burglar {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    fatal: FatalSignal,
    interval: Duration,
}

impl Burglar {
    pub fn new(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        fatal: FatalSignal,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            fatal,
            interval: tick_interval("burglar", interval, DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Run a single sweep cycle and return the eviction count.
    pub async fn sweep_once(&self) -> LockResult<u64> {
        let now = self.clock.now_millis();
        match self.store.delete_expired(now).await {
            Ok(evicted) => {
                if evicted > 0 {
                    info!(evicted = evicted, "Reclaimed expired locks");
                } else {
                    debug!("No expired locks to reclaim");
                }
                metrics::record_sweep(evicted);
                Ok(evicted)
            }
            Err(err) => {
                metrics::record_sweep_failure();
                if let LockError::StoreFatal(reason) = &err {
                    self.fatal.raise(format!("sweeper: {}", reason));
                } else {
                    warn!(error = %err, "Sweep cycle failed, retrying next interval");
                }
                Err(err)
            }
        }
    }

    /// Start the sweep loop until shutdown or a fatal store failure.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "Burglar started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(LockError::StoreFatal(_)) = self.sweep_once().await {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        info!("Burglar stopped");
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(self.run(shutdown_rx))
    }
}
