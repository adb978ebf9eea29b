//! Query monitor
//!
//! Counts store queries and tracks the worst duration and the peak in-flight
//! count between two reads. The DB metrics notifier reads and resets it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use warden_common::{LockError, LockResult};

/// Point-in-time view of the monitor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuerySnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub duration_max: Duration,
    pub in_flight_max: u64,
}

#[derive(Debug, Default)]
pub struct QueryMonitor {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    in_flight_max: AtomicU64,
    duration_max_nanos: AtomicU64,
}

struct InFlightGuard<'a>(&'a AtomicU64);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl QueryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one store query under the monitor.
    ///
    /// Only store failures count as failed queries. Ownership outcomes such as
    /// `AlreadyHeld` mean the database answered.
    pub async fn track<T, F>(&self, query: F) -> LockResult<T>
    where
        F: Future<Output = LockResult<T>>,
    {
        self.total.fetch_add(1, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.in_flight_max.fetch_max(current, Ordering::Relaxed);
        let _guard = InFlightGuard(&self.in_flight);

        let start = Instant::now();
        let result = query.await;
        let elapsed = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.duration_max_nanos.fetch_max(elapsed, Ordering::Relaxed);

        match &result {
            Err(LockError::StoreUnavailable(_)) | Err(LockError::StoreFatal(_)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Read the counters and start a new reporting window.
    pub fn snapshot_and_reset(&self) -> QuerySnapshot {
        let in_flight = self.in_flight.load(Ordering::Relaxed);
        QuerySnapshot {
            total: self.total.swap(0, Ordering::Relaxed),
            succeeded: self.succeeded.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
            duration_max: Duration::from_nanos(self.duration_max_nanos.swap(0, Ordering::Relaxed)),
            in_flight_max: self.in_flight_max.swap(in_flight, Ordering::Relaxed),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_counts_outcomes() {
        let monitor = QueryMonitor::new();

        let ok: LockResult<u32> = monitor.track(async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let _ = monitor
            .track(async { Err::<(), _>(LockError::not_found("k")) })
            .await;
        let _ = monitor
            .track(async { Err::<(), _>(LockError::StoreUnavailable("timeout".into())) })
            .await;

        let snapshot = monitor.snapshot_and_reset();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.in_flight_max, 1);
        assert_eq!(monitor.in_flight(), 0);

        let snapshot = monitor.snapshot_and_reset();
        assert_eq!(snapshot, QuerySnapshot::default());
    }

    #[tokio::test]
    async fn test_in_flight_peak() {
        let monitor = QueryMonitor::new();
        let (a, b) = tokio::join!(
            monitor.track(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, LockError>(())
            }),
            monitor.track(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, LockError>(())
            }),
        );
        assert!(a.is_ok() && b.is_ok());

        let snapshot = monitor.snapshot_and_reset();
        assert_eq!(snapshot.in_flight_max, 2);
        assert!(snapshot.duration_max >= Duration::from_millis(20));
    }
}
