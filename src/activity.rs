//! Liveness classification and human-readable formatting for table entries.

use crate::aggregator::NodeRecord;
use crate::packet::node_id_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    /// Heard within the last few minutes
    Recent,
    Active,
    Inactive,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Recent => "recent",
            ActivityLevel::Active => "active",
            ActivityLevel::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Node,
    Gateway,
    Router,
}

impl std::fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeKind {
    /// Routers by their configured role, gateways by having reported
    /// themselves to MQTT, everything else is a plain node
    pub fn of(node: &NodeRecord) -> Self {
        if node
            .role
            .as_deref()
            .is_some_and(|role| role.starts_with("ROUTER"))
        {
            NodeKind::Router
        } else if node.is_gateway {
            NodeKind::Gateway
        } else {
            NodeKind::Node
        }
    }

    /// (recent, active) thresholds in seconds
    fn thresholds(&self) -> (i64, i64) {
        match self {
            NodeKind::Node => (600, 3600),
            NodeKind::Gateway => (600, 1800),
            NodeKind::Router => (600, 43_200),
        }
    }
}

/// Classify a `last_heard` timestamp (unix seconds) relative to `now`
pub fn activity_level(last_heard: Option<i64>, now: i64, kind: NodeKind) -> ActivityLevel {
    let Some(last_heard) = last_heard.filter(|t| *t > 0) else {
        return ActivityLevel::Inactive;
    };
    let (recent, active) = kind.thresholds();
    let seconds_since = now - last_heard;

    if seconds_since < recent {
        ActivityLevel::Recent
    } else if seconds_since < active {
        ActivityLevel::Active
    } else {
        ActivityLevel::Inactive
    }
}

pub fn format_last_seen(seconds_ago: i64) -> String {
    fn plural(n: i64, unit: &str) -> String {
        format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" })
    }

    if seconds_ago < 60 {
        format!("{} seconds ago", seconds_ago)
    } else if seconds_ago < 3600 {
        plural(seconds_ago / 60, "minute")
    } else if seconds_ago < 86_400 {
        plural(seconds_ago / 3600, "hour")
    } else {
        plural(seconds_ago / 86_400, "day")
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();

    if parts.is_empty() {
        "< 1m".to_string()
    } else {
        parts.join(" ")
    }
}

pub fn node_display_name(node_id: u32, node: Option<&NodeRecord>) -> String {
    node.and_then(NodeRecord::name)
        .map(str::to_string)
        .unwrap_or_else(|| node_id_hex(node_id))
}

pub fn gateway_display_name(gateway_id: &str, node: Option<&NodeRecord>) -> String {
    node.and_then(NodeRecord::name)
        .unwrap_or(gateway_id)
        .to_string()
}
