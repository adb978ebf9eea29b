//! SQL lock store (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Every ownership decision is a single conditional statement, so the database
//! evaluates it against the latest committed version of the row and holds the
//! row lock until commit. Nothing is decided from a value read earlier in the
//! same transaction.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use sea_orm::{prelude::Expr, *};
use warden_common::{LockError, LockKind, LockRecord, LockResult, Resource, deadline_for};

use crate::entity::{lock_indices, locks};
use crate::monitor::QueryMonitor;
use crate::traits::{LockStore, LockStream};

/// Attempts at resolving an insert race before reporting contention.
const MAX_CONFLICT_ATTEMPTS: usize = 3;

const SCHEMA_ERROR_MARKERS: [&str; 5] = [
    "no such table",
    "no such column",
    "doesn't exist",
    "does not exist",
    "unknown column",
];

/// Classify a database error for callers of the lock store.
pub fn store_error(err: DbErr) -> LockError {
    match &err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
            return LockError::StoreUnavailable(err.to_string());
        }
        DbErr::Type(_) | DbErr::TryIntoErr { .. } => {
            return LockError::StoreFatal(err.to_string());
        }
        _ => {}
    }

    let message = err.to_string();
    let lowered = message.to_lowercase();
    if SCHEMA_ERROR_MARKERS.iter().any(|m| lowered.contains(m)) {
        LockError::StoreFatal(message)
    } else {
        LockError::StoreUnavailable(message)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return true;
    }
    // SQLite reports primary key violations with their own extended code.
    err.to_string().contains("UNIQUE constraint failed")
}

/// Row is live at `now_ms`: no deadline, or a deadline not yet passed.
fn live_at(now_ms: i64) -> Condition {
    Condition::any()
        .add(locks::Column::DeadlineMs.is_null())
        .add(locks::Column::DeadlineMs.gte(now_ms))
}

enum InsertOutcome {
    Written(LockRecord),
    Conflict,
}

pub struct SqlLockStore {
    db: DatabaseConnection,
    monitor: Arc<QueryMonitor>,
}

impl SqlLockStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_monitor(db, Arc::new(QueryMonitor::new()))
    }

    pub fn with_monitor(db: DatabaseConnection, monitor: Arc<QueryMonitor>) -> Self {
        Self { db, monitor }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn monitor(&self) -> Arc<QueryMonitor> {
        self.monitor.clone()
    }

    async fn begin(&self) -> LockResult<DatabaseTransaction> {
        let txn = match self.db.get_database_backend() {
            DatabaseBackend::Sqlite => self.db.begin().await,
            _ => {
                self.db
                    .begin_with_config(Some(IsolationLevel::ReadCommitted), None)
                    .await
            }
        };
        txn.map_err(store_error)
    }

    async fn find_row(&self, key: &str) -> LockResult<Option<LockRecord>> {
        locks::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(LockRecord::try_from)
            .transpose()
    }

    /// Advance the key's counter and return the new value.
    ///
    /// Only called by the transaction that holds the key's `locks` row.
    async fn next_index(txn: &DatabaseTransaction, key: &str) -> Result<i64, DbErr> {
        let updated = lock_indices::Entity::update_many()
            .col_expr(
                lock_indices::Column::ModificationIndex,
                Expr::col(lock_indices::Column::ModificationIndex).add(1),
            )
            .filter(lock_indices::Column::Key.eq(key))
            .exec(txn)
            .await?;

        if updated.rows_affected == 0 {
            lock_indices::Entity::insert(lock_indices::ActiveModel {
                key: Set(key.to_string()),
                modification_index: Set(1),
            })
            .exec_without_returning(txn)
            .await?;
            return Ok(1);
        }

        let counter = lock_indices::Entity::find_by_id(key.to_string())
            .one(txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("index counter for '{}'", key)))?;
        Ok(counter.modification_index)
    }

    async fn stamp_index(txn: &DatabaseTransaction, key: &str) -> Result<i64, DbErr> {
        let index = Self::next_index(txn, key).await?;
        locks::Entity::update_many()
            .col_expr(locks::Column::ModificationIndex, Expr::value(index))
            .filter(locks::Column::Key.eq(key))
            .exec(txn)
            .await?;
        Ok(index)
    }

    async fn try_insert_or_take_over(
        &self,
        resource: &Resource,
        ttl_ms: i64,
        now_ms: i64,
    ) -> LockResult<InsertOutcome> {
        let deadline_ms = deadline_for(now_ms, ttl_ms);
        let kind = resource.kind.as_str();
        let txn = self.begin().await?;

        let taken = locks::Entity::update_many()
            .col_expr(locks::Column::Owner, Expr::value(resource.owner.clone()))
            .col_expr(locks::Column::Value, Expr::value(resource.value.clone()))
            .col_expr(locks::Column::Kind, Expr::value(kind))
            .col_expr(locks::Column::TtlMs, Expr::value(ttl_ms))
            .col_expr(locks::Column::DeadlineMs, Expr::value(deadline_ms))
            .filter(locks::Column::Key.eq(resource.key.as_str()))
            .filter(
                Condition::any().add(locks::Column::DeadlineMs.lt(now_ms)).add(
                    Condition::all()
                        .add(locks::Column::Owner.eq(resource.owner.as_str()))
                        .add(locks::Column::Kind.eq(kind)),
                ),
            )
            .exec(&txn)
            .await;

        let written = match taken {
            Ok(result) if result.rows_affected > 0 => Ok(()),
            Ok(_) => locks::Entity::insert(locks::ActiveModel {
                key: Set(resource.key.clone()),
                owner: Set(resource.owner.clone()),
                value: Set(resource.value.clone()),
                kind: Set(kind.to_string()),
                modification_index: Set(0),
                ttl_ms: Set(ttl_ms),
                deadline_ms: Set(deadline_ms),
            })
            .exec_without_returning(&txn)
            .await
            .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // A failed statement aborts the transaction on PostgreSQL.
            let _ = txn.rollback().await;
            if is_unique_violation(&e) {
                return Ok(InsertOutcome::Conflict);
            }
            return Err(store_error(e));
        }

        let index = match Self::stamp_index(&txn, &resource.key).await {
            Ok(index) => index,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(store_error(e));
            }
        };
        txn.commit().await.map_err(store_error)?;

        Ok(InsertOutcome::Written(LockRecord {
            key: resource.key.clone(),
            owner: resource.owner.clone(),
            value: resource.value.clone(),
            kind: resource.kind,
            modification_index: index,
            ttl_ms,
            deadline_ms,
        }))
    }

    /// Explain why the insert lost its race, or `None` if it may be retried.
    async fn conflict_error(&self, resource: &Resource, now_ms: i64) -> LockResult<Option<LockError>> {
        let current = match self.find_row(&resource.key).await? {
            Some(record) if !record.is_expired(now_ms) => record,
            _ => return Ok(None),
        };
        if current.owner != resource.owner {
            return Ok(Some(LockError::AlreadyHeld {
                key: current.key,
                owner: current.owner,
                modification_index: current.modification_index,
            }));
        }
        if current.kind != resource.kind {
            return Ok(Some(LockError::KindMismatch {
                key: current.key,
                existing: current.kind,
                requested: resource.kind,
            }));
        }
        Ok(None)
    }

    async fn do_insert_or_take_over(
        &self,
        resource: &Resource,
        ttl_ms: i64,
        now_ms: i64,
    ) -> LockResult<LockRecord> {
        for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
            match self.try_insert_or_take_over(resource, ttl_ms, now_ms).await? {
                InsertOutcome::Written(record) => return Ok(record),
                InsertOutcome::Conflict => {
                    if let Some(err) = self.conflict_error(resource, now_ms).await? {
                        return Err(err);
                    }
                    tracing::debug!(
                        key = %resource.key,
                        attempt = attempt,
                        "Lock row changed under a concurrent insert, retrying"
                    );
                }
            }
        }
        Err(LockError::StoreUnavailable(format!(
            "lock '{}' is contended, gave up after {} attempts",
            resource.key, MAX_CONFLICT_ATTEMPTS
        )))
    }

    async fn do_renew(&self, resource: &Resource, ttl_ms: i64, now_ms: i64) -> LockResult<LockRecord> {
        let deadline_ms = deadline_for(now_ms, ttl_ms);
        let txn = self.begin().await?;

        let renewed = locks::Entity::update_many()
            .col_expr(locks::Column::Value, Expr::value(resource.value.clone()))
            .col_expr(locks::Column::TtlMs, Expr::value(ttl_ms))
            .col_expr(locks::Column::DeadlineMs, Expr::value(deadline_ms))
            .filter(locks::Column::Key.eq(resource.key.as_str()))
            .filter(locks::Column::Owner.eq(resource.owner.as_str()))
            .filter(locks::Column::Kind.eq(resource.kind.as_str()))
            .filter(live_at(now_ms))
            .exec(&txn)
            .await;

        let renewed = match renewed {
            Ok(result) => result.rows_affected > 0,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(store_error(e));
            }
        };

        if !renewed {
            let _ = txn.rollback().await;
            return Err(match self.find_row(&resource.key).await? {
                Some(current) if !current.is_expired(now_ms) && current.owner != resource.owner => {
                    LockError::NotOwner {
                        key: resource.key.clone(),
                        owner: resource.owner.clone(),
                        current_owner: Some(current.owner),
                    }
                }
                Some(current) if !current.is_expired(now_ms) && current.kind != resource.kind => {
                    LockError::KindMismatch {
                        key: resource.key.clone(),
                        existing: current.kind,
                        requested: resource.kind,
                    }
                }
                _ => LockError::not_found(resource.key.as_str()),
            });
        }

        let index = match Self::stamp_index(&txn, &resource.key).await {
            Ok(index) => index,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(store_error(e));
            }
        };
        txn.commit().await.map_err(store_error)?;

        Ok(LockRecord {
            key: resource.key.clone(),
            owner: resource.owner.clone(),
            value: resource.value.clone(),
            kind: resource.kind,
            modification_index: index,
            ttl_ms,
            deadline_ms,
        })
    }

    async fn do_release(&self, key: &str, owner: &str, now_ms: i64) -> LockResult<bool> {
        let deleted = locks::Entity::delete_many()
            .filter(locks::Column::Key.eq(key))
            .filter(locks::Column::Owner.eq(owner))
            .exec(&self.db)
            .await
            .map_err(store_error)?;
        if deleted.rows_affected > 0 {
            return Ok(true);
        }

        match self.find_row(key).await? {
            Some(current) if !current.is_expired(now_ms) => Err(LockError::NotOwner {
                key: key.to_string(),
                owner: owner.to_string(),
                current_owner: Some(current.owner),
            }),
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LockStore for SqlLockStore {
    async fn fetch(&self, key: &str) -> LockResult<LockRecord> {
        self.monitor
            .track(async {
                self.find_row(key)
                    .await?
                    .ok_or_else(|| LockError::not_found(key))
            })
            .await
    }

    async fn fetch_all<'a>(&'a self, kind: Option<LockKind>) -> LockResult<LockStream<'a>> {
        self.monitor
            .track(async {
                let mut select = locks::Entity::find();
                if let Some(kind) = kind {
                    select = select.filter(locks::Column::Kind.eq(kind.as_str()));
                }
                let rows = select.stream(&self.db).await.map_err(store_error)?;
                let records = rows.map(|row| row.map_err(store_error).and_then(LockRecord::try_from));
                Ok(records.boxed())
            })
            .await
    }

    async fn insert_or_take_over(
        &self,
        resource: &Resource,
        ttl_ms: i64,
        now_ms: i64,
    ) -> LockResult<LockRecord> {
        self.monitor
            .track(self.do_insert_or_take_over(resource, ttl_ms, now_ms))
            .await
    }

    async fn renew(&self, resource: &Resource, ttl_ms: i64, now_ms: i64) -> LockResult<LockRecord> {
        self.monitor
            .track(self.do_renew(resource, ttl_ms, now_ms))
            .await
    }

    async fn release(&self, key: &str, owner: &str, now_ms: i64) -> LockResult<bool> {
        self.monitor.track(self.do_release(key, owner, now_ms)).await
    }

    async fn delete_expired(&self, now_ms: i64) -> LockResult<u64> {
        self.monitor
            .track(async {
                let deleted = locks::Entity::delete_many()
                    .filter(locks::Column::DeadlineMs.is_not_null())
                    .filter(locks::Column::DeadlineMs.lt(now_ms))
                    .exec(&self.db)
                    .await
                    .map_err(store_error)?;
                Ok(deleted.rows_affected)
            })
            .await
    }

    async fn count_live(&self, kind: LockKind, now_ms: i64) -> LockResult<u64> {
        self.monitor
            .track(async {
                locks::Entity::find()
                    .filter(locks::Column::Kind.eq(kind.as_str()))
                    .filter(live_at(now_ms))
                    .count(&self.db)
                    .await
                    .map_err(store_error)
            })
            .await
    }

    async fn health_check(&self) -> LockResult<()> {
        self.monitor
            .track(async { self.db.ping().await.map_err(store_error) })
            .await
    }
}
