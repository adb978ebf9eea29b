//! Database connection setup
//!
//! The driver is inferred from the URL scheme. The broker supports MySQL and
//! PostgreSQL in production and SQLite for embedded and test deployments.

use std::fmt;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    MySql,
    Postgres,
    Sqlite,
}

impl DatabaseDriver {
    pub fn from_url(url: &str) -> Result<Self, DbErr> {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "mysql" => Ok(DatabaseDriver::MySql),
            "postgres" | "postgresql" => Ok(DatabaseDriver::Postgres),
            "sqlite" => Ok(DatabaseDriver::Sqlite),
            _ => Err(DbErr::Custom(format!(
                "unsupported database url scheme '{}', expected mysql, postgres or sqlite",
                scheme
            ))),
        }
    }
}

impl fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseDriver::MySql => write!(f, "mysql"),
            DatabaseDriver::Postgres => write!(f, "postgres"),
            DatabaseDriver::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub sqlx_logging: bool,
}

impl DatabaseOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn driver(&self) -> Result<DatabaseDriver, DbErr> {
        DatabaseDriver::from_url(&self.url)
    }

    /// An in-memory SQLite database lives inside one connection.
    fn is_sqlite_memory(&self) -> bool {
        self.url.starts_with("sqlite:") && self.url.contains(":memory:")
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 20,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(10),
            max_lifetime: Duration::from_secs(1800),
            sqlx_logging: false,
        }
    }
}

/// Open the connection pool and check that the database answers.
pub async fn connect(options: &DatabaseOptions) -> Result<DatabaseConnection, DbErr> {
    let driver = options.driver()?;

    let (max_connections, min_connections) = if options.is_sqlite_memory() {
        (1, 1)
    } else {
        (
            options.max_connections.max(1),
            options.min_connections.min(options.max_connections.max(1)),
        )
    };

    let mut opt = ConnectOptions::new(options.url.clone());

    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(options.connect_timeout)
        .acquire_timeout(options.acquire_timeout)
        .sqlx_logging(options.sqlx_logging);

    // Pooled in-memory connections must never be recycled.
    if !options.is_sqlite_memory() {
        opt.idle_timeout(options.idle_timeout)
            .max_lifetime(options.max_lifetime);
    }

    tracing::info!(
        driver = %driver,
        max_connections = max_connections,
        min_connections = min_connections,
        connect_timeout_ms = options.connect_timeout.as_millis() as u64,
        acquire_timeout_ms = options.acquire_timeout.as_millis() as u64,
        sqlx_logging = options.sqlx_logging,
        "Database connection pool configured"
    );

    let database_connection = Database::connect(opt).await?;
    database_connection.ping().await?;

    Ok(database_connection)
}
