//! Warden Persistence - Lock store
//!
//! This crate provides:
//! - SeaORM entity definitions for the lock tables
//! - The `LockStore` trait and its SQL implementation
//! - Connection setup, schema bootstrap and the query monitor

pub mod db;
pub mod entity;
pub mod monitor;
pub mod schema;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

pub use db::{DatabaseDriver, DatabaseOptions, connect};
pub use monitor::{QueryMonitor, QuerySnapshot};
pub use schema::bootstrap;
pub use sql::SqlLockStore;
pub use traits::{LockStore, LockStream};
