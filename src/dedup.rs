use std::collections::HashSet;

use crate::packet::PacketIdentity;

/// Identities of every packet folded since the last reset.
///
/// Entries are never evicted: "seen before" is permanent for the session so
/// that redeliveries after a reconnect are recognized however late they come.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketDedupIndex {
    seen: HashSet<PacketIdentity>,
}

impl PacketDedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &PacketIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Record `identity`. Returns true the first time it is seen.
    pub fn insert(&mut self, identity: PacketIdentity) -> bool {
        self.seen.insert(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
