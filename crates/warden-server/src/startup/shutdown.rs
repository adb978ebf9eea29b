//! Process shutdown handling
//!
//! Turns OS signals into the shared [`ShutdownSignal`] and decides why the
//! server stopped.

use tokio::sync::broadcast;
use tracing::info;
use warden_core::{FatalSignal, ShutdownSignal};

/// Why the server is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C or SIGTERM
    Signal,
    /// The lock engine found the store unusable
    Fatal(String),
    /// The HTTP server exited on its own
    ServerExited,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal => 0,
            ShutdownReason::Fatal(_) | ShutdownReason::ServerExited => 1,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
///
/// Returns the shutdown signal that can be used to notify other components
pub async fn wait_for_shutdown_signal() -> ShutdownSignal {
    let shutdown = ShutdownSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        shutdown_clone.shutdown();
    });

    shutdown
}

/// Resolve when either an OS signal or the fatal signal arrives.
pub async fn wait_for_stop(
    mut shutdown_rx: broadcast::Receiver<()>,
    fatal: &FatalSignal,
) -> ShutdownReason {
    tokio::select! {
        _ = shutdown_rx.recv() => ShutdownReason::Signal,
        reason = fatal.raised() => ShutdownReason::Fatal(reason),
    }
}
