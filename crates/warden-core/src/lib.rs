//! Warden Core - Lock consistency engine
//!
//! This crate provides:
//! - `LockPick`: acquire/renew/release/fetch/watch policy over a `LockStore`
//! - `Burglar`: the background sweeper of expired records
//! - The in-process change feed used by watchers
//! - The fatal signal, shutdown signal and metrics notifiers

pub mod burglar;
pub mod fatal;
pub mod feed;
pub mod lock_pick;
pub mod metrics;
pub mod notifier;
pub mod shutdown;

pub use burglar::Burglar;
pub use fatal::FatalSignal;
pub use feed::{ChangeFeed, LockEvent};
pub use lock_pick::{LockPick, LockPickConfig};
pub use notifier::{DbMetricsNotifier, LockMetricsNotifier};
pub use shutdown::ShutdownSignal;
