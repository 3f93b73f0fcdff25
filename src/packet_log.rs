use std::collections::VecDeque;
use std::sync::Arc;

use crate::packet::{Packet, node_id_hex};

/// Default number of packets kept in the live feed
pub const DEFAULT_PACKET_LOG_CAPACITY: usize = 100;

/// Capped, newest-first feed of raw packets with pause/resume.
///
/// While paused the visible `items` are frozen and arrivals collect in a
/// separate buffer; resuming puts the buffered packets (newest first) in
/// front of the frozen items.
#[derive(Debug, Clone)]
pub struct PacketLog {
    items: VecDeque<Arc<Packet>>,
    buffered: VecDeque<Arc<Packet>>,
    paused: bool,
    capacity: usize,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PACKET_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            buffered: VecDeque::new(),
            paused: false,
            capacity,
        }
    }

    pub fn push(&mut self, packet: Arc<Packet>) {
        let target = if self.paused {
            &mut self.buffered
        } else {
            &mut self.items
        };
        target.push_front(packet);
        target.truncate(self.capacity);
    }

    /// Flip pause. Returns the new paused state.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        if !self.paused {
            // `buffered` is already newest first
            while let Some(packet) = self.buffered.pop_back() {
                self.items.push_front(packet);
            }
            self.items.truncate(self.capacity);
        }
        self.paused
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.buffered.clear();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Visible packets, newest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Packet>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Packets received while paused, newest first
    pub fn buffered(&self) -> impl Iterator<Item = &Arc<Packet>> {
        self.buffered.iter()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Visible packets matching a free-text filter (case-insensitive) on port
    /// name, sender id, channel, gateway or message text. An empty query
    /// matches everything.
    pub fn filtered<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Arc<Packet>> + 'a {
        let needle = query.trim().to_lowercase();
        self.items
            .iter()
            .filter(move |packet| needle.is_empty() || matches_filter(packet, &needle))
    }
}

impl Default for PacketLog {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(packet: &Packet, needle: &str) -> bool {
    let data = &packet.data;
    let port = data.port_num.map(|port| port.name().to_lowercase());
    let sender = data.from.map(node_id_hex);

    [
        port.as_deref(),
        sender.as_deref(),
        data.channel(),
        data.gateway(),
        data.text(),
        packet.info.channel.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}
