use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::aggregator::{Aggregator, FoldOutcome, MeshState, MeshSummary};
use crate::connection_info::{ConnectionInfo, ConnectionInfoTracker};
use crate::error::StreamError;
use crate::packet_log::PacketLog;
use crate::stream::{StreamEvent, StreamState};

/// Longest bad payload excerpt written to the log
const BAD_DATA_PREVIEW: usize = 120;

/// Counters for everything that crossed the pipeline boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub messages: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub bad_data: u64,
    pub info: u64,
    pub errors: u64,
}

/// Single subscriber of the stream: routes every event to the aggregator,
/// the live packet log and the connection tracker.
#[derive(Debug)]
pub struct EventPipeline {
    aggregator: Aggregator,
    packet_log: PacketLog,
    connection: ConnectionInfoTracker,
    status: StreamState,
    last_info: Option<String>,
    stats: PipelineStats,
}

impl EventPipeline {
    pub fn new(packet_log_capacity: usize) -> Self {
        Self {
            aggregator: Aggregator::new(),
            packet_log: PacketLog::with_capacity(packet_log_capacity),
            connection: ConnectionInfoTracker::new(),
            status: StreamState::Idle,
            last_info: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Message(packet) => {
                self.stats.messages += 1;
                match self.aggregator.process_packet(&packet) {
                    FoldOutcome::New => {
                        metrics::counter!("pipeline.packets_total", "outcome" => "new").increment(1);
                    }
                    FoldOutcome::Duplicate => {
                        self.stats.duplicates += 1;
                        trace!(
                            "Duplicate packet {}",
                            packet.identity().map(|id| id.to_string()).unwrap_or_default()
                        );
                        metrics::counter!("pipeline.packets_total", "outcome" => "duplicate")
                            .increment(1);
                    }
                    FoldOutcome::Dropped => {
                        self.stats.dropped += 1;
                        debug!("Dropping packet without from/id on topic {:?}", packet.info.full_topic);
                        metrics::counter!("pipeline.packets_total", "outcome" => "dropped")
                            .increment(1);
                    }
                }
                self.packet_log.push(packet);
            }
            StreamEvent::Info(text) => {
                self.stats.info += 1;
                if text.starts_with("Heartbeat") {
                    trace!("{}", text);
                } else {
                    info!("Bridge: {}", text);
                }
                self.last_info = Some(text);
            }
            StreamEvent::ConnectionInfo(info) => {
                info!(
                    "Bridge connected={} server={} topic={}",
                    info.connected, info.mqtt_server, info.mqtt_topic
                );
                self.connection.update(info);
            }
            StreamEvent::BadData(raw) => {
                self.stats.bad_data += 1;
                warn!("Unparseable stream payload: {}", preview(&raw));
                metrics::counter!("pipeline.bad_data_total").increment(1);
            }
            StreamEvent::Status(state) => {
                debug!("Stream status: {}", state.status_text());
                if matches!(
                    state,
                    StreamState::Reconnecting { .. } | StreamState::Exhausted
                ) {
                    self.connection.set_connected(false);
                }
                self.status = state;
            }
        }
    }

    pub fn handle_error(&mut self, error: &StreamError) {
        self.stats.errors += 1;
        self.connection.set_connected(false);
        if error.is_terminal() {
            self.status = StreamState::Exhausted;
        }
    }

    /// Clear every table, the live feed and the connection metadata
    pub fn reset(&mut self) {
        self.aggregator.reset();
        self.packet_log.clear();
        self.connection.reset();
        self.last_info = None;
    }

    pub fn state(&self) -> &MeshState {
        self.aggregator.state()
    }

    pub fn aggregator_mut(&mut self) -> &mut Aggregator {
        &mut self.aggregator
    }

    pub fn summary(&self) -> MeshSummary {
        self.aggregator.state().summary()
    }

    pub fn packet_log(&self) -> &PacketLog {
        &self.packet_log
    }

    pub fn packet_log_mut(&mut self) -> &mut PacketLog {
        &mut self.packet_log
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.info()
    }

    pub fn status(&self) -> StreamState {
        self.status
    }

    pub fn last_info(&self) -> Option<&str> {
        self.last_info.as_deref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

fn preview(raw: &str) -> String {
    match raw.char_indices().nth(BAD_DATA_PREVIEW) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use std::sync::Arc;
    use std::time::Duration;

    fn message(from: u32, id: u32) -> StreamEvent {
        let mut packet = Packet::default();
        packet.data.from = Some(from);
        packet.data.id = Some(id);
        packet.data.rx_time = Some(1000);
        StreamEvent::Message(Arc::new(packet))
    }

    #[test]
    fn test_routes_messages_to_both_consumers() {
        let mut pipeline = EventPipeline::new(10);
        pipeline.handle_event(message(1, 1));
        pipeline.handle_event(message(1, 1));
        pipeline.handle_event(StreamEvent::Message(Arc::new(Packet::default())));

        assert_eq!(pipeline.summary().nodes, 1);
        assert_eq!(pipeline.packet_log().len(), 3);
        let stats = pipeline.stats();
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_connection_tracking() {
        let mut pipeline = EventPipeline::new(10);
        pipeline.handle_event(StreamEvent::ConnectionInfo(ConnectionInfo {
            mqtt_server: "mqtt.meshtastic.org".to_string(),
            connected: true,
            ..Default::default()
        }));
        assert!(pipeline.connection_info().unwrap().connected);

        pipeline.handle_event(StreamEvent::Status(StreamState::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1),
        }));
        assert!(!pipeline.connection_info().unwrap().connected);
    }

    #[test]
    fn test_bad_data_and_reset() {
        let mut pipeline = EventPipeline::new(10);
        pipeline.handle_event(StreamEvent::BadData("{oops".to_string()));
        pipeline.handle_event(StreamEvent::Info("Connected to Meshtastic stream".to_string()));
        pipeline.handle_event(message(2, 7));
        assert_eq!(pipeline.stats().bad_data, 1);
        assert_eq!(pipeline.last_info(), Some("Connected to Meshtastic stream"));

        pipeline.reset();
        assert_eq!(pipeline.summary(), MeshSummary::default());
        assert!(pipeline.packet_log().is_empty());
        assert!(pipeline.last_info().is_none());
    }

    #[test]
    fn test_exhaustion_is_recorded() {
        let mut pipeline = EventPipeline::new(10);
        pipeline.handle_error(&StreamError::Closed);
        assert_eq!(pipeline.status(), StreamState::Idle);
        pipeline.handle_error(&StreamError::Exhausted { attempts: 3 });
        assert_eq!(pipeline.status(), StreamState::Exhausted);
        assert_eq!(pipeline.stats().errors, 2);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), BAD_DATA_PREVIEW + 3);
    }
}
