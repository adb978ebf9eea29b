//! Lock store trait
//!
//! Defines the durable source of truth for ownership. Every ownership decision
//! an implementation makes must be evaluated atomically against the latest
//! committed state of the key.

use async_trait::async_trait;
use futures::stream::BoxStream;
use warden_common::{LockKind, LockRecord, LockResult, Resource};

/// Lazy stream of records produced by [`LockStore::fetch_all`].
pub type LockStream<'a> = BoxStream<'a, LockResult<LockRecord>>;

/// Lock persistence operations
///
/// Times are epoch milliseconds read from the broker's clock. The store never
/// reads a clock itself.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Fetch the stored record for `key`, expired or not.
    async fn fetch(&self, key: &str) -> LockResult<LockRecord>;

    /// Stream every stored record, optionally of a single kind.
    async fn fetch_all<'a>(&'a self, kind: Option<LockKind>) -> LockResult<LockStream<'a>>;

    /// Create the record, take over an expired one, or refresh the caller's own.
    ///
    /// Fails with `AlreadyHeld` when another owner holds a live record and
    /// with `KindMismatch` when the caller holds it under the other kind.
    async fn insert_or_take_over(
        &self,
        resource: &Resource,
        ttl_ms: i64,
        now_ms: i64,
    ) -> LockResult<LockRecord>;

    /// Extend the caller's live record.
    async fn renew(&self, resource: &Resource, ttl_ms: i64, now_ms: i64) -> LockResult<LockRecord>;

    /// Delete the caller's record. Absent or expired keys succeed; the flag
    /// says whether a row was actually removed.
    async fn release(&self, key: &str, owner: &str, now_ms: i64) -> LockResult<bool>;

    /// Delete every record whose deadline is before `now_ms`.
    async fn delete_expired(&self, now_ms: i64) -> LockResult<u64>;

    /// Count live records of one kind.
    async fn count_live(&self, kind: LockKind, now_ms: i64) -> LockResult<u64>;

    async fn health_check(&self) -> LockResult<()>;
}
