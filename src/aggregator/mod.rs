//! Folds decoded packets into the derived network model.
//!
//! Four tables are maintained (nodes, gateways, channels, per-channel text
//! messages) together with the dedup index. Gateway statistics follow every
//! delivery of a packet, including redeliveries after a reconnect; the
//! content tables count each packet identity exactly once.

mod message_log;
mod records;

pub use message_log::{MAX_MESSAGES_PER_CHANNEL, MessageLog};
pub use records::{ChannelRecord, GatewayRecord, NodeRecord, TextMessage};

use serde::Serialize;
use std::collections::BTreeMap;

use crate::dedup::PacketDedupIndex;
use crate::packet::{Packet, parse_node_id};

/// What a single fold did with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// No `from` or `id`; nothing was touched
    Dropped,
    /// Identity seen before; only gateway statistics were updated
    Duplicate,
    /// First delivery; all tables were updated
    New,
}

/// Derived tables for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshState {
    pub nodes: BTreeMap<u32, NodeRecord>,
    pub gateways: BTreeMap<String, GatewayRecord>,
    pub channels: BTreeMap<String, ChannelRecord>,
    pub messages: MessageLog,
    #[serde(skip)]
    pub processed: PacketDedupIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_node_id: Option<u32>,
}

/// Table sizes, for logging and the replay report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSummary {
    pub nodes: usize,
    pub gateways: usize,
    pub channels: usize,
    pub text_messages: usize,
    pub unique_packets: usize,
}

impl MeshState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure form of [`MeshState::apply`]
    pub fn fold(mut self, packet: &Packet) -> Self {
        self.apply(packet);
        self
    }

    /// Fold one packet into the tables.
    ///
    /// Order matters: the dedup index is consulted and updated first, gateway
    /// statistics are updated for every delivery, then channel, node and
    /// message-log updates run only for first-seen identities.
    pub fn apply(&mut self, packet: &Packet) -> FoldOutcome {
        let Some(identity) = packet.identity() else {
            return FoldOutcome::Dropped;
        };
        let is_new = self.processed.insert(identity);

        let data = &packet.data;
        let from = identity.from;
        let timestamp = packet.timestamp();
        let channel_id = data.channel();
        let gateway_id = data.gateway();
        let text = data.text();

        if let Some(gateway_id) = gateway_id
            && !is_self_report(gateway_id, from)
        {
            let gateway = self
                .gateways
                .entry(gateway_id.to_string())
                .or_insert_with(|| GatewayRecord::new(gateway_id, timestamp));
            gateway.last_heard = gateway.last_heard.max(timestamp);
            gateway.message_count += 1;
            if text.is_some() {
                gateway.text_message_count += 1;
            }
            if let Some(channel_id) = channel_id {
                gateway.channel_ids.insert(channel_id.to_string());
            }
            gateway.observed_nodes.insert(from);
        }

        if !is_new {
            return FoldOutcome::Duplicate;
        }

        if let Some(channel_id) = channel_id {
            let channel = self
                .channels
                .entry(channel_id.to_string())
                .or_insert_with(|| ChannelRecord::new(channel_id));
            channel.message_count += 1;
            if text.is_some() {
                channel.text_message_count += 1;
            }
            channel.last_message = Some(channel.last_message.map_or(timestamp, |t| t.max(timestamp)));
            if let Some(gateway_id) = gateway_id {
                channel.gateways.insert(gateway_id.to_string());
            }
            channel.nodes.insert(from);
        }

        let node = self
            .nodes
            .entry(from)
            .or_insert_with(|| NodeRecord::new(from, timestamp));
        node.last_heard = node.last_heard.max(timestamp);
        node.message_count += 1;
        if text.is_some() {
            node.text_message_count += 1;
        }
        if let Some(channel_id) = channel_id {
            node.channel_id = Some(channel_id.to_string());
        }
        if let Some(gateway_id) = gateway_id {
            node.gateway_id = Some(gateway_id.to_string());
        }
        if let Some(user) = &data.node_info {
            node.merge_user(user);
        }
        if let Some(position) = &data.position {
            node.position = Some(position.clone());
        }
        if let Some(telemetry) = &data.telemetry {
            node.merge_telemetry(telemetry);
        }
        if let Some(report) = &data.map_report {
            node.merge_map_report(report, timestamp);
            if gateway_id.is_some_and(|gateway_id| is_self_report(gateway_id, from)) {
                node.is_gateway = true;
            }
        }

        if let (Some(text), Some(channel_id)) = (text, channel_id) {
            let from_name = node.name().map(str::to_string);
            self.messages.insert(TextMessage {
                id: identity.id,
                from,
                from_name,
                text: text.to_string(),
                timestamp,
                channel_id: channel_id.to_string(),
                gateway_id: gateway_id.unwrap_or_default().to_string(),
            });
        }

        FoldOutcome::New
    }

    pub fn node(&self, node_id: u32) -> Option<&NodeRecord> {
        self.nodes.get(&node_id)
    }

    pub fn gateway(&self, gateway_id: &str) -> Option<&GatewayRecord> {
        self.gateways.get(gateway_id)
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelRecord> {
        self.channels.get(channel_id)
    }

    /// Text messages for a channel, newest first
    pub fn messages(&self, channel_id: &str) -> &[TextMessage] {
        self.messages.channel(channel_id)
    }

    pub fn summary(&self) -> MeshSummary {
        MeshSummary {
            nodes: self.nodes.len(),
            gateways: self.gateways.len(),
            channels: self.channels.len(),
            text_messages: self.messages.total(),
            unique_packets: self.processed.len(),
        }
    }

    /// Clear every table, the dedup index and the selection together
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A gateway id naming the sender itself means the node is reporting its own
/// traffic to MQTT, not relaying someone else's.
fn is_self_report(gateway_id: &str, from: u32) -> bool {
    parse_node_id(gateway_id) == Some(from)
}

/// Owns the session's [`MeshState`]. Created once per session by the caller.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: MeshState,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_packet(&mut self, packet: &Packet) -> FoldOutcome {
        self.state.apply(packet)
    }

    pub fn state(&self) -> &MeshState {
        &self.state
    }

    pub fn select_node(&mut self, node_id: Option<u32>) {
        self.state.selected_node_id = node_id;
    }

    pub fn selected_node(&self) -> Option<&NodeRecord> {
        self.state
            .selected_node_id
            .and_then(|node_id| self.state.node(node_id))
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Tear down the aggregator, handing back the final tables
    pub fn dispose(self) -> MeshState {
        self.state
    }
}
