//! Prometheus exporter

use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global recorder and serve `/metrics` on `address`.
pub fn install_prometheus_exporter(address: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on {}", address))?;
    tracing::info!(address = %address, "Prometheus exporter listening");
    Ok(())
}
