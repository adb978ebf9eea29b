//! Configuration management for Warden server
//!
//! Sources, lowest precedence first: the YAML file, `WARDEN_*` environment
//! variables (`WARDEN_DB__URL` sets `db.url`), then command line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, Environment, File};
use warden_core::LockPickConfig;
use warden_core::burglar::DEFAULT_SWEEP_INTERVAL;
use warden_core::notifier::DEFAULT_REPORT_INTERVAL;
use warden_persistence::DatabaseOptions;

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/warden.yml";
pub const DEFAULT_SERVER_PORT: u16 = 8891;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "warden-server", version, about = "Distributed lock and presence broker")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    /// Address to serve the lock API on, as host:port
    #[arg(long = "listen-address")]
    pub listen_address: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the process arguments.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        // An explicit file must exist; the default one is optional.
        let file = match &args.config {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config_builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("WARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(v) = args.database_url {
            config_builder = config_builder
                .set_override("db.url", v)
                .context("Failed to set database URL override")?;
        }
        if let Some(v) = args.listen_address {
            let (address, port) = v
                .rsplit_once(':')
                .with_context(|| format!("listen address '{}' is not host:port", v))?;
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in listen address '{}'", v))?;
            config_builder = config_builder
                .set_override("server.address", address)?
                .set_override("server.port", port as i64)?;
        }

        let config = config_builder
            .build()
            .context("Failed to build configuration")?;

        Ok(Configuration { config })
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        let value = self.config.get_int(key).unwrap_or(default as i64);
        Duration::from_millis(value.max(0) as u64)
    }

    /// A period that drives a timer loop, rejected unless positive.
    fn interval(&self, key: &str, default: Duration) -> anyhow::Result<Duration> {
        let value = self
            .config
            .get_int(key)
            .unwrap_or(default.as_millis() as i64);
        if value <= 0 {
            anyhow::bail!("{} must be a positive number of milliseconds, got {}", key, value);
        }
        Ok(Duration::from_millis(value as u64))
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> anyhow::Result<u16> {
        let port = self
            .config
            .get_int("server.port")
            .unwrap_or(DEFAULT_SERVER_PORT.into());
        u16::try_from(port).with_context(|| format!("server.port {} is out of range", port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.millis("server.shutdown_timeout_ms", 30_000)
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    pub fn database_options(&self) -> anyhow::Result<DatabaseOptions> {
        let url = self
            .config
            .get_string("db.url")
            .context("db.url is not configured")?;
        let defaults = DatabaseOptions::default();

        Ok(DatabaseOptions {
            url,
            max_connections: self
                .config
                .get_int("db.max_connections")
                .unwrap_or(defaults.max_connections.into()) as u32,
            min_connections: self
                .config
                .get_int("db.min_connections")
                .unwrap_or(defaults.min_connections.into()) as u32,
            connect_timeout: self.millis(
                "db.connect_timeout_ms",
                defaults.connect_timeout.as_millis() as u64,
            ),
            acquire_timeout: self.millis(
                "db.acquire_timeout_ms",
                defaults.acquire_timeout.as_millis() as u64,
            ),
            sqlx_logging: self
                .config
                .get_bool("db.sqlx_logging")
                .unwrap_or(defaults.sqlx_logging),
            ..defaults
        })
    }

    // ========================================================================
    // Lock Engine Configuration
    // ========================================================================

    pub fn sweep_interval(&self) -> anyhow::Result<Duration> {
        self.interval("lock.sweep_interval_ms", DEFAULT_SWEEP_INTERVAL)
    }

    pub fn lock_pick_config(&self) -> anyhow::Result<LockPickConfig> {
        let defaults = LockPickConfig::default();
        Ok(LockPickConfig {
            watch_poll_interval: self
                .interval("lock.watch_poll_interval_ms", defaults.watch_poll_interval)?,
            watch_max_wait: self.millis(
                "lock.watch_max_wait_ms",
                defaults.watch_max_wait.as_millis() as u64,
            ),
        })
    }

    // ========================================================================
    // Metrics & Logging Configuration
    // ========================================================================

    pub fn report_interval(&self) -> anyhow::Result<Duration> {
        self.interval("metrics.report_interval_ms", DEFAULT_REPORT_INTERVAL)
    }

    /// Listener for the Prometheus scrape endpoint, if enabled.
    pub fn prometheus_address(&self) -> anyhow::Result<Option<SocketAddr>> {
        match self.config.get_string("metrics.prometheus_address") {
            Ok(v) if !v.trim().is_empty() => Ok(Some(
                v.parse()
                    .with_context(|| format!("invalid metrics.prometheus_address '{}'", v))?,
            )),
            _ => Ok(None),
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.file_enabled").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn cli(file: &tempfile::NamedTempFile) -> Cli {
        Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
server:
  address: 127.0.0.1
  port: 9000
db:
  url: "sqlite::memory:"
  max_connections: 4
lock:
  sweep_interval_ms: 2000
  watch_max_wait_ms: 15000
metrics:
  prometheus_address: "127.0.0.1:9100"
"#,
        );
        let configuration = Configuration::from_cli(cli(&file)).unwrap();

        assert_eq!(configuration.server_address(), "127.0.0.1");
        assert_eq!(configuration.server_port().unwrap(), 9000);
        assert_eq!(configuration.sweep_interval().unwrap(), Duration::from_secs(2));
        assert_eq!(
            configuration.lock_pick_config().unwrap().watch_max_wait,
            Duration::from_secs(15)
        );
        assert_eq!(
            configuration.prometheus_address().unwrap(),
            Some("127.0.0.1:9100".parse().unwrap())
        );

        let db = configuration.database_options().unwrap();
        assert_eq!(db.url, "sqlite::memory:");
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.min_connections, 1);
    }

    #[test]
    fn test_defaults() {
        let file = write_config("db:\n  url: \"sqlite::memory:\"\n");
        let configuration = Configuration::from_cli(cli(&file)).unwrap();

        assert_eq!(configuration.server_port().unwrap(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.sweep_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(configuration.report_interval().unwrap(), Duration::from_secs(60));
        assert_eq!(configuration.prometheus_address().unwrap(), None);
        assert_eq!(
            configuration.lock_pick_config().unwrap(),
            LockPickConfig::default()
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config("db:\n  url: \"mysql://localhost/warden\"\n");
        let configuration = Configuration::from_cli(Cli {
            config: Some(file.path().to_path_buf()),
            database_url: Some("sqlite::memory:".to_string()),
            listen_address: Some("127.0.0.1:7777".to_string()),
        })
        .unwrap();

        assert_eq!(configuration.database_options().unwrap().url, "sqlite::memory:");
        assert_eq!(configuration.server_address(), "127.0.0.1");
        assert_eq!(configuration.server_port().unwrap(), 7777);
    }

    #[test]
    fn test_non_positive_intervals_are_rejected() {
        let file = write_config(
            r#"
lock:
  sweep_interval_ms: 0
  watch_poll_interval_ms: -5
metrics:
  report_interval_ms: 0
"#,
        );
        let configuration = Configuration::from_cli(cli(&file)).unwrap();

        assert!(configuration.sweep_interval().is_err());
        assert!(configuration.report_interval().is_err());
        assert!(configuration.lock_pick_config().is_err());
    }

    #[test]
    fn test_port_out_of_range() {
        for port in ["70000", "-1"] {
            let file = write_config(&format!("server:\n  port: {}\n", port));
            let configuration = Configuration::from_cli(cli(&file)).unwrap();
            assert!(configuration.server_port().is_err(), "port {}", port);
        }
    }

    #[test]
    fn test_invalid_listen_address() {
        let file = write_config("{}\n");
        let result = Configuration::from_cli(Cli {
            config: Some(file.path().to_path_buf()),
            listen_address: Some("localhost".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Configuration::from_cli(Cli {
            config: Some(PathBuf::from("/nonexistent/warden.yml")),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
