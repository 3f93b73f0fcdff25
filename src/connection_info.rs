//! Upstream bridge metadata, sent once per stream as a `connection_info` event.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default)]
    pub mqtt_server: String,
    #[serde(default)]
    pub mqtt_topic: String,
    #[serde(default)]
    pub connected: bool,
    pub server_time: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionInfoTracker {
    info: Option<ConnectionInfo>,
}

impl ConnectionInfoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, info: ConnectionInfo) {
        self.info = Some(info);
    }

    /// Only meaningful once the bridge has described itself
    pub fn set_connected(&mut self, connected: bool) {
        if let Some(info) = self.info.as_mut() {
            info.connected = connected;
        }
    }

    pub fn reset(&mut self) {
        self.info = None;
    }

    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }
}
