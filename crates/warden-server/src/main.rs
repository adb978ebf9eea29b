//! Main entry point for the Warden lock server.
//!
//! Startup order: configuration, logging, metrics, database and schema, lock
//! engine, background tasks, HTTP server. Shutdown runs the other way and the
//! process exits non-zero when the lock engine asked for it.

use std::process::ExitCode;

use tracing::{error, info};
use warden_server::model::config::Configuration;
use warden_server::startup::{self, Engine, EngineOptions, ShutdownReason};

#[actix_web::main]
async fn main() -> anyhow::Result<ExitCode> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    warden_core::metrics::init_metrics();
    if let Some(address) = configuration.prometheus_address()? {
        startup::install_prometheus_exporter(address)?;
    }

    let server_address = configuration.server_address();
    let server_port = configuration.server_port()?;
    let shutdown_timeout = configuration.shutdown_timeout();

    let engine = match Engine::start(EngineOptions::from_configuration(&configuration)?).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Lock engine failed to start: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let shutdown_signal = startup::wait_for_shutdown_signal().await;
    let background = engine.spawn_background(&shutdown_signal);

    let server = startup::lock_server(
        engine.handler(),
        server_address.clone(),
        server_port,
        shutdown_timeout.as_secs(),
    )?;
    let server_handle = server.handle();
    info!(
        address = %server_address,
        port = server_port,
        "Warden lock server started"
    );

    let fatal = engine.fatal();
    let mut server = std::pin::pin!(server);
    let mut server_done = false;
    let reason = tokio::select! {
        result = &mut server => {
            server_done = true;
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
            ShutdownReason::ServerExited
        }
        reason = startup::wait_for_stop(shutdown_signal.subscribe(), &fatal) => reason,
    };

    match &reason {
        ShutdownReason::Fatal(cause) => error!(cause = %cause, "Shutting down on fatal store failure"),
        other => info!(reason = ?other, "Shutting down"),
    }

    // Stop accepting requests and let in-flight ones finish.
    if !server_done {
        let stopping = server_handle.stop(true);
        let (_, result) = tokio::join!(stopping, &mut server);
        if let Err(e) = result {
            error!("Server error during shutdown: {}", e);
        }
    }

    // Background tasks leave between cycles.
    shutdown_signal.shutdown();
    for handle in background {
        if let Err(e) = handle.await {
            error!("Background task failed: {}", e);
        }
    }

    if let Err(e) = engine.close().await {
        error!("{:#}", e);
    }

    info!("Warden server shutdown complete");
    Ok(ExitCode::from(reason.exit_code() as u8))
}
