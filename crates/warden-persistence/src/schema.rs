//! Schema bootstrap
//!
//! Creates the lock tables when absent and checks that the ones found match
//! the entities. A schema that cannot be read is unrecoverable.

use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, EntityTrait, QuerySelect, Schema};
use warden_common::{LockError, LockResult};

use crate::entity::{lock_indices, locks};

pub const DEADLINE_INDEX: &str = "idx_locks_deadline";

/// Keys and owners compare byte for byte on every backend.
///
/// MySQL string columns otherwise inherit the database collation, which is
/// usually case and accent insensitive.
pub const MYSQL_CHARSET: &str = "utf8mb4";
pub const MYSQL_COLLATION: &str = "utf8mb4_bin";

fn deadline_index() -> IndexCreateStatement {
    let mut index = Index::create();
    index
        .name(DEADLINE_INDEX)
        .table(locks::Entity)
        .col(locks::Column::DeadlineMs);
    index
}

fn with_binary_collation(backend: DatabaseBackend, table: &mut TableCreateStatement) {
    if backend == DatabaseBackend::MySql {
        table.character_set(MYSQL_CHARSET).collate(MYSQL_COLLATION);
    }
}

pub fn locks_table(backend: DatabaseBackend) -> TableCreateStatement {
    let mut table = Schema::new(backend).create_table_from_entity(locks::Entity);
    table.if_not_exists();
    with_binary_collation(backend, &mut table);
    // MySQL has no CREATE INDEX IF NOT EXISTS, so the index goes into the table.
    if backend == DatabaseBackend::MySql {
        table.index(&mut deadline_index());
    }
    table
}

pub fn lock_indices_table(backend: DatabaseBackend) -> TableCreateStatement {
    let mut table = Schema::new(backend).create_table_from_entity(lock_indices::Entity);
    table.if_not_exists();
    with_binary_collation(backend, &mut table);
    table
}

pub async fn create_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    db.execute(backend.build(&locks_table(backend))).await?;
    if backend != DatabaseBackend::MySql {
        let mut index = deadline_index();
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    db.execute(backend.build(&lock_indices_table(backend)))
        .await?;

    tracing::info!(backend = ?backend, "Lock schema ensured");
    Ok(())
}

/// Select every mapped column of both tables.
pub async fn verify_schema<C: ConnectionTrait>(db: &C) -> LockResult<()> {
    locks::Entity::find()
        .limit(1)
        .all(db)
        .await
        .map_err(|e| LockError::StoreFatal(format!("locks table unusable: {}", e)))?;
    lock_indices::Entity::find()
        .limit(1)
        .all(db)
        .await
        .map_err(|e| LockError::StoreFatal(format!("lock_indices table unusable: {}", e)))?;
    Ok(())
}

/// Create the schema if needed, then verify it.
pub async fn bootstrap<C: ConnectionTrait>(db: &C) -> LockResult<()> {
    create_schema(db)
        .await
        .map_err(|e| LockError::StoreFatal(format!("schema bootstrap failed: {}", e)))?;
    verify_schema(db).await
}
