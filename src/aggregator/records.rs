use serde::Serialize;

use crate::ordered_set::OrderedSet;
use crate::packet::{DeviceMetrics, EnvironmentMetrics, MapReport, Position, Telemetry, User};

/// Everything known about one mesh node, built up from the packets it sent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: u32,
    pub last_heard: i64,
    pub message_count: u64,
    pub text_message_count: u64,

    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub mac_addr: Option<String>,
    pub hw_model: Option<String>,
    pub battery_level: Option<u32>,
    pub snr: Option<f32>,
    pub is_licensed: Option<bool>,
    pub role: Option<String>,
    pub public_key: Option<String>,

    pub position: Option<Position>,
    pub device_metrics: Option<DeviceMetrics>,
    pub environment_metrics: Option<EnvironmentMetrics>,
    pub map_report: Option<MapReport>,
    /// Set once the node has published a map report about itself as gateway
    pub is_gateway: bool,

    /// Channel and gateway of the most recent packet from this node
    pub channel_id: Option<String>,
    pub gateway_id: Option<String>,
}

impl NodeRecord {
    pub fn new(node_id: u32, first_heard: i64) -> Self {
        Self {
            node_id,
            last_heard: first_heard,
            message_count: 0,
            text_message_count: 0,
            short_name: None,
            long_name: None,
            mac_addr: None,
            hw_model: None,
            battery_level: None,
            snr: None,
            is_licensed: None,
            role: None,
            public_key: None,
            position: None,
            device_metrics: None,
            environment_metrics: None,
            map_report: None,
            is_gateway: false,
            channel_id: None,
            gateway_id: None,
        }
    }

    /// Overwrite descriptive fields that are present in `user`; absent or
    /// empty fields leave the known value alone.
    pub fn merge_user(&mut self, user: &User) {
        overwrite_text(&mut self.short_name, &user.short_name);
        overwrite_text(&mut self.long_name, &user.long_name);
        overwrite_text(&mut self.mac_addr, &user.macaddr);
        overwrite_text(&mut self.hw_model, &user.hw_model);
        overwrite_text(&mut self.role, &user.role);
        overwrite_text(&mut self.public_key, &user.public_key);
        if user.battery_level.is_some() {
            self.battery_level = user.battery_level;
        }
        if user.snr.is_some() {
            self.snr = user.snr;
        }
        if user.is_licensed.is_some() {
            self.is_licensed = user.is_licensed;
        }
    }

    /// Metrics blocks are replaced wholesale; battery level is mirrored from
    /// device metrics.
    pub fn merge_telemetry(&mut self, telemetry: &Telemetry) {
        if let Some(device) = &telemetry.device_metrics {
            self.device_metrics = Some(device.clone());
            if device.battery_level.is_some() {
                self.battery_level = device.battery_level;
            }
        }
        if let Some(environment) = &telemetry.environment_metrics {
            self.environment_metrics = Some(environment.clone());
        }
    }

    /// Keep the latest map report and use it to fill identity and position
    /// gaps. Values learned from NODEINFO/POSITION packets take precedence.
    pub fn merge_map_report(&mut self, report: &MapReport, timestamp: i64) {
        self.map_report = Some(report.clone());
        fill_text(&mut self.long_name, &report.long_name);
        fill_text(&mut self.short_name, &report.short_name);
        fill_text(&mut self.hw_model, &report.hw_model);
        fill_text(&mut self.role, &report.role);

        if self.position.is_none()
            && let (Some(latitude_i), Some(longitude_i)) = (report.latitude_i, report.longitude_i)
        {
            self.position = Some(Position {
                latitude_i: Some(latitude_i),
                longitude_i: Some(longitude_i),
                altitude: report.altitude,
                time: Some(timestamp),
                precision_bits: report.position_precision,
                ..Default::default()
            });
        }
    }

    /// Short name, then long name
    pub fn name(&self) -> Option<&str> {
        self.short_name.as_deref().or(self.long_name.as_deref())
    }
}

fn overwrite_text(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value
        && !value.is_empty()
    {
        *target = Some(value.clone());
    }
}

fn fill_text(target: &mut Option<String>, value: &Option<String>) {
    if target.is_none() {
        overwrite_text(target, value);
    }
}

/// An MQTT gateway, seen relaying packets that other nodes originated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRecord {
    pub gateway_id: String,
    pub last_heard: i64,
    pub message_count: u64,
    pub text_message_count: u64,
    pub channel_ids: OrderedSet<String>,
    pub observed_nodes: OrderedSet<u32>,
}

impl GatewayRecord {
    pub fn new(gateway_id: &str, first_heard: i64) -> Self {
        Self {
            gateway_id: gateway_id.to_string(),
            last_heard: first_heard,
            message_count: 0,
            text_message_count: 0,
            channel_ids: OrderedSet::new(),
            observed_nodes: OrderedSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub channel_id: String,
    pub message_count: u64,
    pub text_message_count: u64,
    pub last_message: Option<i64>,
    pub gateways: OrderedSet<String>,
    pub nodes: OrderedSet<u32>,
}

impl ChannelRecord {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message_count: 0,
            text_message_count: 0,
            last_message: None,
            gateways: OrderedSet::new(),
            nodes: OrderedSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub id: u32,
    pub from: u32,
    pub from_name: Option<String>,
    pub text: String,
    pub timestamp: i64,
    pub channel_id: String,
    /// Empty when the packet did not say which gateway relayed it
    pub gateway_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_user_is_sparse() {
        let mut node = NodeRecord::new(1, 100);
        node.merge_user(&User {
            short_name: Some("ABCD".to_string()),
            long_name: Some("Alpha Bravo".to_string()),
            hw_model: Some("HELTEC_V3".to_string()),
            ..Default::default()
        });

        node.merge_user(&User {
            short_name: Some("".to_string()),
            long_name: None,
            snr: Some(6.5),
            ..Default::default()
        });

        assert_eq!(node.short_name.as_deref(), Some("ABCD"));
        assert_eq!(node.long_name.as_deref(), Some("Alpha Bravo"));
        assert_eq!(node.hw_model.as_deref(), Some("HELTEC_V3"));
        assert_eq!(node.snr, Some(6.5));
    }

    #[test]
    fn test_device_metrics_mirror_battery() {
        let mut node = NodeRecord::new(1, 100);
        node.merge_user(&User {
            battery_level: Some(40),
            ..Default::default()
        });

        node.merge_telemetry(&Telemetry {
            device_metrics: Some(DeviceMetrics {
                battery_level: Some(87),
                voltage: Some(4.1),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(node.battery_level, Some(87));
        assert_eq!(node.device_metrics.as_ref().unwrap().voltage, Some(4.1));
        assert!(node.environment_metrics.is_none());
    }

    #[test]
    fn test_map_report_only_fills_gaps() {
        let mut node = NodeRecord::new(1, 100);
        node.short_name = Some("KNWN".to_string());

        node.merge_map_report(
            &MapReport {
                short_name: Some("MAPR".to_string()),
                long_name: Some("Map Reported".to_string()),
                latitude_i: Some(407_000_000),
                longitude_i: Some(-740_000_000),
                position_precision: Some(13),
                ..Default::default()
            },
            500,
        );

        assert_eq!(node.short_name.as_deref(), Some("KNWN"));
        assert_eq!(node.long_name.as_deref(), Some("Map Reported"));
        let position = node.position.as_ref().unwrap();
        assert_eq!(position.time, Some(500));
        assert_eq!(position.precision_bits, Some(13));
        assert!(node.map_report.is_some());
    }

    #[test]
    fn test_name_prefers_short_name() {
        let mut node = NodeRecord::new(1, 0);
        assert_eq!(node.name(), None);
        node.long_name = Some("Long".to_string());
        assert_eq!(node.name(), Some("Long"));
        node.short_name = Some("S".to_string());
        assert_eq!(node.name(), Some("S"));
    }
}
