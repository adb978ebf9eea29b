//! Lock Pick: acquisition, renewal and release policy
//!
//! Validates input, reads the shared clock and delegates every ownership
//! decision to the store. It holds no locks and caches no records, so any
//! number of calls may run at once and several brokers may share one store.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, future};
use tokio::time::Instant;
use warden_common::validation::{validate_key, validate_owner, validate_resource, validate_ttl};
use warden_common::{Clock, LockError, LockKind, LockRecord, LockResult, Resource};
use warden_persistence::{LockStore, LockStream};

use crate::feed::ChangeFeed;
use crate::metrics;

pub const DEFAULT_WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_WATCH_MAX_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPickConfig {
    /// How often a watcher re-reads the store when no local event arrives.
    pub watch_poll_interval: Duration,
    /// Upper bound for a single watch call.
    pub watch_max_wait: Duration,
}

impl Default for LockPickConfig {
    fn default() -> Self {
        Self {
            watch_poll_interval: DEFAULT_WATCH_POLL_INTERVAL,
            watch_max_wait: DEFAULT_WATCH_MAX_WAIT,
        }
    }
}

pub struct LockPick {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed,
    config: LockPickConfig,
}

impl LockPick {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, LockPickConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        config: LockPickConfig,
    ) -> Self {
        Self {
            store,
            clock,
            feed: ChangeFeed::new(),
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn LockStore> {
        self.store.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn config(&self) -> LockPickConfig {
        self.config
    }

    /// Acquire `resource` for `ttl`, or refresh it if the caller already owns it.
    pub async fn acquire(&self, resource: Resource, ttl: Duration) -> LockResult<LockRecord> {
        validate_resource(&resource)?;
        let ttl_ms = validate_ttl(ttl)?;
        let now = self.clock.now_millis();

        match self.store.insert_or_take_over(&resource, ttl_ms, now).await {
            Ok(record) => {
                tracing::debug!(
                    key = %record.key,
                    owner = %record.owner,
                    kind = %record.kind,
                    modification_index = record.modification_index,
                    "Lock acquired"
                );
                metrics::record_acquisition(record.kind);
                self.feed.publish(&record.key, Some(record.modification_index));
                Ok(record)
            }
            Err(err) => {
                if let LockError::AlreadyHeld { owner, .. } = &err {
                    tracing::debug!(key = %resource.key, holder = %owner, "Lock already held");
                    metrics::record_conflict();
                }
                Err(err)
            }
        }
    }

    /// Extend a record the caller holds. Never creates one.
    pub async fn renew(&self, resource: Resource, ttl: Duration) -> LockResult<LockRecord> {
        validate_resource(&resource)?;
        let ttl_ms = validate_ttl(ttl)?;
        let now = self.clock.now_millis();

        let record = self.store.renew(&resource, ttl_ms, now).await?;
        tracing::debug!(
            key = %record.key,
            owner = %record.owner,
            modification_index = record.modification_index,
            "Lock renewed"
        );
        self.feed.publish(&record.key, Some(record.modification_index));
        Ok(record)
    }

    /// Release `owner`'s record. Returns whether a record was removed; a
    /// release of an absent or expired key succeeds without side effects.
    pub async fn release(&self, key: &str, owner: &str) -> LockResult<bool> {
        validate_key(key)?;
        validate_owner(owner)?;
        let now = self.clock.now_millis();

        let removed = self.store.release(key, owner, now).await?;
        if removed {
            tracing::debug!(key = %key, owner = %owner, "Lock released");
            metrics::record_release();
            self.feed.publish(key, None);
        }
        Ok(removed)
    }

    /// Fetch the live record for `key`. Expired records and records of
    /// another kind are reported as absent.
    pub async fn fetch(&self, key: &str, kind: Option<LockKind>) -> LockResult<LockRecord> {
        validate_key(key)?;
        self.fetch_live(key, kind)
            .await?
            .ok_or_else(|| LockError::not_found(key))
    }

    /// Stream every live record, optionally of one kind.
    pub async fn fetch_all(&self, kind: Option<LockKind>) -> LockResult<LockStream<'_>> {
        let now = self.clock.now_millis();
        let records = self.store.fetch_all(kind).await?;
        Ok(records
            .try_filter(move |record| future::ready(!record.is_expired(now)))
            .boxed())
    }

    /// Block until the state of `key` differs from `known_index` or `timeout`
    /// elapses, then return the current state.
    ///
    /// `known_index` of `None` means the caller believes the key is absent.
    /// Dropping the returned future cancels the wait.
    pub async fn watch(
        &self,
        key: &str,
        kind: Option<LockKind>,
        known_index: Option<i64>,
        timeout: Duration,
    ) -> LockResult<Option<LockRecord>> {
        validate_key(key)?;
        let deadline = Instant::now() + timeout.min(self.config.watch_max_wait);
        // Subscribe before the first read so no change slips in between.
        let mut subscription = self.feed.subscribe();

        loop {
            let current = self.fetch_live(key, kind).await?;
            if current.as_ref().map(|r| r.modification_index) != known_index {
                return Ok(current);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(current);
            }
            let mut wait = (deadline - now).min(self.config.watch_poll_interval);
            // Wake up when the record is due to expire.
            if let Some(remaining) = current
                .as_ref()
                .and_then(|r| r.remaining_ttl_ms(self.clock.now_millis()))
            {
                wait = wait.min(Duration::from_millis(remaining.max(0) as u64 + 1));
            }

            tokio::select! {
                _ = subscription.changed(key) => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    pub async fn health_check(&self) -> LockResult<()> {
        self.store.health_check().await
    }

    async fn fetch_live(&self, key: &str, kind: Option<LockKind>) -> LockResult<Option<LockRecord>> {
        let now = self.clock.now_millis();
        match self.store.fetch(key).await {
            Ok(record) if record.is_expired(now) => Ok(None),
            Ok(record) if kind.is_some_and(|k| k != record.kind) => Ok(None),
            Ok(record) => Ok(Some(record)),
            Err(LockError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
