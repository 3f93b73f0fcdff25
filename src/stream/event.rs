use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::sse::SseFrame;
use crate::connection_info::ConnectionInfo;
use crate::packet::Packet;

/// Typed events handed to the subscriber, in transport order
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Plain status text from the bridge, including heartbeats
    Info(String),
    ConnectionInfo(ConnectionInfo),
    Message(Arc<Packet>),
    /// Payload that failed to parse, kept verbatim
    BadData(String),
    Status(StreamState),
}

impl StreamEvent {
    /// Map a decoded SSE frame onto a typed event. Unknown event names
    /// (such as the bridge's `padding` flush) yield `None`.
    pub fn from_frame(frame: SseFrame, received_at: i64) -> Option<Self> {
        match frame.event_name() {
            "info" => Some(StreamEvent::Info(frame.data)),
            "connection_info" => match serde_json::from_str::<ConnectionInfo>(&frame.data) {
                Ok(info) => Some(StreamEvent::ConnectionInfo(info)),
                Err(e) => {
                    debug!("Failed to parse connection_info payload: {}", e);
                    Some(StreamEvent::BadData(frame.data))
                }
            },
            "message" => match serde_json::from_str::<Packet>(&frame.data) {
                Ok(mut packet) => {
                    packet.received_at = Some(received_at);
                    Some(StreamEvent::Message(Arc::new(packet)))
                }
                Err(e) => {
                    debug!("Failed to parse message payload: {}", e);
                    Some(StreamEvent::BadData(frame.data))
                }
            },
            other => {
                trace!("Ignoring SSE event '{}'", other);
                None
            }
        }
    }

    /// Whether this event means the upstream bridge is healthy again
    pub fn restores_connectivity(&self) -> bool {
        match self {
            StreamEvent::Info(text) => text.contains("Connected"),
            StreamEvent::ConnectionInfo(info) => info.connected,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Info(_) => "info",
            StreamEvent::ConnectionInfo(_) => "connection_info",
            StreamEvent::Message(_) => "message",
            StreamEvent::BadData(_) => "bad_data",
            StreamEvent::Status(_) => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    /// Automatic reconnection gave up; `start` may be called again
    Exhausted,
    Closed,
}

impl StreamState {
    pub fn status_text(&self) -> String {
        match self {
            StreamState::Idle => "Idle".to_string(),
            StreamState::Connecting => "Connecting...".to_string(),
            StreamState::Open => "Connected".to_string(),
            StreamState::Reconnecting { attempt, delay } => format!(
                "Connection error. Reconnecting in {:.1}s (attempt {})...",
                delay.as_secs_f64(),
                attempt
            ),
            StreamState::Exhausted => "Connection error. Gave up reconnecting".to_string(),
            StreamState::Closed => "Disconnected".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Exhausted | StreamState::Closed)
    }
}
