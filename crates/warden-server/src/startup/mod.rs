//! Server startup and shutdown

pub mod engine;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use engine::{Engine, EngineOptions};
pub use http::lock_server;
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use metrics::install_prometheus_exporter;
pub use shutdown::{ShutdownReason, wait_for_shutdown_signal, wait_for_stop};
