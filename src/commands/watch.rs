use anyhow::Result;
use meshstream::activity::{
    NodeKind, activity_level, format_last_seen, gateway_display_name, node_display_name,
};
use meshstream::{EventPipeline, MeshstreamConfig, StreamClient, StreamState};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Nodes and gateways listed under each summary line
const SUMMARY_TOP_N: usize = 5;

fn lock(pipeline: &Mutex<EventPipeline>) -> MutexGuard<'_, EventPipeline> {
    pipeline.lock().unwrap_or_else(PoisonError::into_inner)
}

pub async fn handle_watch(
    endpoint: Option<String>,
    config_path: Option<PathBuf>,
    summary_interval: u64,
    metrics_port: Option<u16>,
) -> Result<()> {
    let mut config = MeshstreamConfig::resolve(config_path.as_deref())?;
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }

    if let Some(port) = metrics_port {
        meshstream::metrics::start_metrics_server(port)?;
        meshstream::metrics::initialize_stream_metrics();
    }

    info!(
        "Watching {} (packet log capacity {}, up to {} reconnect attempts)",
        config.endpoint, config.packet_log.capacity, config.reconnect.max_attempts
    );

    let pipeline = Arc::new(Mutex::new(EventPipeline::new(config.packet_log.capacity)));
    let client = StreamClient::new(config.stream_client_config());

    let events = pipeline.clone();
    let errors = pipeline.clone();
    let handle = client.start(
        move |event| lock(&events).handle_event(event),
        move |stream_error| {
            if stream_error.is_terminal() {
                error!("{}", stream_error);
            }
            lock(&errors).handle_error(&stream_error);
        },
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(summary_interval.max(1)));
    // First tick completes immediately
    ticker.tick().await;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping stream");
                break Ok(());
            }
            state = handle.finished() => {
                break match state {
                    StreamState::Exhausted => Err(anyhow::anyhow!(
                        "Stream gave up reconnecting to {}",
                        config.endpoint
                    )),
                    other => {
                        warn!("Stream ended: {}", other.status_text());
                        Ok(())
                    }
                };
            }
            _ = ticker.tick() => log_summary(&lock(&pipeline)),
        }
    };

    handle.stop();
    log_summary(&lock(&pipeline));
    outcome
}

fn log_summary(pipeline: &EventPipeline) {
    let summary = pipeline.summary();
    let stats = pipeline.stats();
    meshstream::metrics::record_summary(&summary);

    info!(
        "{}: {} nodes, {} gateways, {} channels, {} text messages ({} packets, {} duplicates, {} bad payloads)",
        pipeline.status().status_text(),
        summary.nodes,
        summary.gateways,
        summary.channels,
        summary.text_messages,
        summary.unique_packets,
        stats.duplicates,
        stats.bad_data
    );

    if let Some(info) = pipeline.connection_info() {
        info!(
            "Bridge {} topic {} ({})",
            info.mqtt_server,
            info.mqtt_topic,
            if info.connected { "connected" } else { "disconnected" }
        );
    }

    let state = pipeline.state();
    let now = chrono::Utc::now().timestamp();

    let mut nodes: Vec<_> = state.nodes.values().collect();
    nodes.sort_by(|a, b| b.last_heard.cmp(&a.last_heard));
    for node in nodes.into_iter().take(SUMMARY_TOP_N) {
        info!(
            "  node {} heard {} [{}] {} packets",
            node_display_name(node.node_id, Some(node)),
            format_last_seen(now - node.last_heard),
            activity_level(Some(node.last_heard), now, NodeKind::of(node)),
            node.message_count
        );
    }

    let mut gateways: Vec<_> = state.gateways.values().collect();
    gateways.sort_by(|a, b| b.message_count.cmp(&a.message_count));
    for gateway in gateways.into_iter().take(SUMMARY_TOP_N) {
        let own_node = meshstream::packet::parse_node_id(&gateway.gateway_id)
            .and_then(|node_id| state.node(node_id));
        info!(
            "  gateway {} relayed {} packets from {} nodes [{}]",
            gateway_display_name(&gateway.gateway_id, own_node),
            gateway.message_count,
            gateway.observed_nodes.len(),
            activity_level(Some(gateway.last_heard), now, NodeKind::Gateway)
        );
    }
}
