use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::aggregator::MeshSummary;

/// Install the Prometheus recorder with its own HTTP listener serving
/// `/metrics`. Must be called from inside a tokio runtime.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics listener on {}", addr))?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Initialize stream and pipeline metrics to zero so they are scraped
/// before the first event
pub fn initialize_stream_metrics() {
    for kind in ["connect", "status", "transport", "closed", "idle_timeout"] {
        metrics::counter!("stream.connection_failed_total", "kind" => kind).absolute(0);
    }
    metrics::counter!("stream.connected_total").absolute(0);
    metrics::counter!("stream.exhausted_total").absolute(0);
    for event in ["info", "connection_info", "message", "bad_data"] {
        metrics::counter!("stream.events_total", "event" => event).absolute(0);
    }

    for outcome in ["new", "duplicate", "dropped"] {
        metrics::counter!("pipeline.packets_total", "outcome" => outcome).absolute(0);
    }
    metrics::counter!("pipeline.bad_data_total").absolute(0);

    record_summary(&MeshSummary::default());
}

/// Publish table sizes as gauges
pub fn record_summary(summary: &MeshSummary) {
    metrics::gauge!("mesh.nodes").set(summary.nodes as f64);
    metrics::gauge!("mesh.gateways").set(summary.gateways as f64);
    metrics::gauge!("mesh.channels").set(summary.channels as f64);
    metrics::gauge!("mesh.text_messages").set(summary.text_messages as f64);
    metrics::gauge!("mesh.unique_packets").set(summary.unique_packets as f64);
}
