use serde::Serialize;
use std::collections::BTreeMap;

use super::records::TextMessage;

/// Maximum number of text messages kept per channel
pub const MAX_MESSAGES_PER_CHANNEL: usize = 100;

/// Text messages grouped by channel, each list newest first and capped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageLog {
    channels: BTreeMap<String, Vec<TextMessage>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the list sorted by timestamp descending. A message
    /// goes after every existing message with the same or a newer
    /// timestamp, so equal timestamps keep arrival order.
    pub fn insert(&mut self, message: TextMessage) {
        let list = self.channels.entry(message.channel_id.clone()).or_default();
        let position = list.partition_point(|existing| existing.timestamp >= message.timestamp);
        if position >= MAX_MESSAGES_PER_CHANNEL {
            // Older than everything retained
            return;
        }
        list.insert(position, message);
        list.truncate(MAX_MESSAGES_PER_CHANNEL);
    }

    pub fn channel(&self, channel_id: &str) -> &[TextMessage] {
        self.channels
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &[TextMessage])> {
        self.channels
            .iter()
            .map(|(id, list)| (id.as_str(), list.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
