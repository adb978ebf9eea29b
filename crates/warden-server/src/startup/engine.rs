//! Lock engine assembly
//!
//! Brings the engine up in order: connection pool, schema, Lock Pick, then the
//! background tasks. Tear-down runs in reverse.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::info;
use warden_common::{Clock, SystemClock};
use warden_core::{
    Burglar, DbMetricsNotifier, FatalSignal, LockMetricsNotifier, LockPick, LockPickConfig,
    ShutdownSignal,
};
use warden_persistence::sea_orm::DatabaseConnection;
use warden_persistence::{DatabaseOptions, SqlLockStore, bootstrap, connect};

use crate::model::config::Configuration;
use crate::service::LockHandler;

/// Engine settings taken from configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub database: DatabaseOptions,
    pub lock_pick: LockPickConfig,
    pub sweep_interval: Duration,
    pub report_interval: Duration,
}

impl EngineOptions {
    pub fn from_configuration(configuration: &Configuration) -> anyhow::Result<Self> {
        Ok(Self {
            database: configuration.database_options()?,
            lock_pick: configuration.lock_pick_config()?,
            sweep_interval: configuration.sweep_interval()?,
            report_interval: configuration.report_interval()?,
        })
    }
}

pub struct Engine {
    db: DatabaseConnection,
    store: Arc<SqlLockStore>,
    clock: Arc<dyn Clock>,
    fatal: FatalSignal,
    handler: LockHandler,
    options: EngineOptions,
}

impl Engine {
    /// Connect, bootstrap the schema and build the engine.
    ///
    /// Any failure here is fatal to startup.
    pub async fn start(options: EngineOptions) -> anyhow::Result<Self> {
        Self::start_with_clock(options, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let db = connect(&options.database)
            .await
            .context("Failed to connect to the lock database")?;
        bootstrap(&db)
            .await
            .context("Lock database schema is unusable")?;
        info!("Lock database ready");

        let store = Arc::new(SqlLockStore::new(db.clone()));
        let pick = Arc::new(LockPick::with_config(
            store.clone(),
            clock.clone(),
            options.lock_pick,
        ));
        let fatal = FatalSignal::new();
        let handler = LockHandler::new(pick, fatal.clone());

        Ok(Self {
            db,
            store,
            clock,
            fatal,
            handler,
            options,
        })
    }

    pub fn handler(&self) -> LockHandler {
        self.handler.clone()
    }

    pub fn fatal(&self) -> FatalSignal {
        self.fatal.clone()
    }

    pub fn store(&self) -> Arc<SqlLockStore> {
        self.store.clone()
    }

    /// Start the sweeper and the metrics notifiers.
    pub fn spawn_background(&self, shutdown: &ShutdownSignal) -> Vec<JoinHandle<()>> {
        let burglar = Burglar::new(
            self.store.clone(),
            self.clock.clone(),
            self.fatal.clone(),
            self.options.sweep_interval,
        );
        let lock_notifier = LockMetricsNotifier::new(
            self.store.clone(),
            self.clock.clone(),
            self.options.report_interval,
        );
        let db_notifier = DbMetricsNotifier::new(self.store.monitor(), self.options.report_interval);

        vec![
            burglar.spawn(shutdown.clone()),
            lock_notifier.spawn(shutdown.clone()),
            db_notifier.spawn(shutdown.clone()),
        ]
    }

    /// Close the connection pool.
    pub async fn close(self) -> anyhow::Result<()> {
        drop(self.handler);
        drop(self.store);
        self.db
            .close()
            .await
            .context("Failed to close the lock database")?;
        info!("Lock database closed");
        Ok(())
    }
}
