//! Request handler for the lock API
//!
//! Mirrors Lock Pick one call at a time. Each call is measured and logged, and
//! a `StoreFatal` failure raises the process-fatal signal. No state is kept
//! between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use warden_common::{LockError, LockKind, LockRecord, LockResult, Resource};
use warden_core::metrics::{self, Timer};
use warden_core::{FatalSignal, LockPick};

pub const ACQUIRE: &str = "acquire";
pub const RENEW: &str = "renew";
pub const RELEASE: &str = "release";
pub const FETCH: &str = "fetch";
pub const FETCH_ALL: &str = "fetch_all";
pub const WATCH: &str = "watch";

/// Finishes the in-flight accounting even when the call is dropped.
struct InFlight {
    operation: &'static str,
    timer: Timer,
}

impl InFlight {
    fn start(operation: &'static str) -> Self {
        metrics::record_request_started(operation);
        Self {
            operation,
            timer: Timer::new(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::record_request_done(self.operation, self.timer.elapsed_secs());
    }
}

#[derive(Clone)]
pub struct LockHandler {
    pick: Arc<LockPick>,
    fatal: FatalSignal,
}

impl LockHandler {
    pub fn new(pick: Arc<LockPick>, fatal: FatalSignal) -> Self {
        Self { pick, fatal }
    }

    pub fn pick(&self) -> &Arc<LockPick> {
        &self.pick
    }

    pub async fn acquire(&self, resource: Resource, ttl: Duration) -> LockResult<LockRecord> {
        self.observe(ACQUIRE, self.pick.acquire(resource, ttl)).await
    }

    pub async fn renew(&self, resource: Resource, ttl: Duration) -> LockResult<LockRecord> {
        self.observe(RENEW, self.pick.renew(resource, ttl)).await
    }

    pub async fn release(&self, key: &str, owner: &str) -> LockResult<bool> {
        self.observe(RELEASE, self.pick.release(key, owner)).await
    }

    pub async fn fetch(&self, key: &str, kind: Option<LockKind>) -> LockResult<LockRecord> {
        self.observe(FETCH, self.pick.fetch(key, kind)).await
    }

    pub async fn fetch_all(&self, kind: Option<LockKind>) -> LockResult<Vec<LockRecord>> {
        self.observe(FETCH_ALL, async {
            let records = self.pick.fetch_all(kind).await?;
            records.try_collect::<Vec<_>>().await
        })
        .await
    }

    pub async fn watch(
        &self,
        key: &str,
        kind: Option<LockKind>,
        known_index: Option<i64>,
        timeout: Duration,
    ) -> LockResult<Option<LockRecord>> {
        self.observe(WATCH, self.pick.watch(key, kind, known_index, timeout))
            .await
    }

    pub async fn health_check(&self) -> LockResult<()> {
        let result = self.pick.health_check().await;
        self.check_fatal(&result);
        result
    }

    async fn observe<T, F>(&self, operation: &'static str, call: F) -> LockResult<T>
    where
        F: Future<Output = LockResult<T>>,
    {
        let in_flight = InFlight::start(operation);
        let result = call.await;

        match &result {
            Ok(_) => {
                tracing::debug!(
                    operation = operation,
                    elapsed_ms = (in_flight.timer.elapsed_secs() * 1000.0) as u64,
                    "Lock request succeeded"
                );
            }
            Err(err) => {
                tracing::debug!(
                    operation = operation,
                    error = %err,
                    kind = err.kind(),
                    "Lock request failed"
                );
            }
        }
        metrics::record_request_outcome(operation, result.as_ref().err().map(LockError::kind));
        self.check_fatal(&result);
        result
    }

    fn check_fatal<T>(&self, result: &LockResult<T>) {
        if let Err(LockError::StoreFatal(reason)) = result {
            self.fatal.raise(reason.clone());
        }
    }
}
