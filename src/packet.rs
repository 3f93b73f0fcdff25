//! Decoded Meshtastic packets as delivered by the upstream MQTT bridge.
//!
//! The bridge serializes packets with protojson (camelCase field names,
//! unpopulated fields emitted). Only the fields the aggregator and the live
//! feed look at are modeled; everything else is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One decoded application-layer packet plus the MQTT topic it arrived on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    #[serde(default)]
    pub info: TopicInfo,
    #[serde(default)]
    pub data: Data,
    /// Unix seconds at which the stream client decoded this packet.
    /// Stamped locally so the receive time survives queueing downstream.
    #[serde(skip)]
    pub received_at: Option<i64>,
}

/// Parsed components of the MQTT topic (`msh/<region>/2/e/<channel>/<user>`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicInfo {
    pub full_topic: Option<String>,
    pub region_path: Option<String>,
    pub version: Option<String>,
    pub format: Option<String>,
    pub channel: Option<String>,
    pub user_id: Option<String>,
}

/// Flattened service envelope + mesh packet + decoded payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Data {
    pub channel_id: Option<String>,
    pub gateway_id: Option<String>,

    pub id: Option<u32>,
    pub from: Option<u32>,
    pub to: Option<u32>,
    pub hop_limit: Option<u32>,
    pub hop_start: Option<u32>,
    pub want_ack: Option<bool>,
    pub priority: Option<String>,
    pub via_mqtt: Option<bool>,
    pub next_hop: Option<u32>,
    pub relay_node: Option<u32>,
    pub rx_time: Option<i64>,

    pub port_num: Option<PortNum>,

    pub text_message: Option<String>,
    pub position: Option<Position>,
    pub node_info: Option<User>,
    pub telemetry: Option<Telemetry>,
    pub map_report: Option<MapReport>,

    pub decode_error: Option<String>,
}

impl Packet {
    /// Dedup identity, or `None` when the packet carries no `from`/`id`
    pub fn identity(&self) -> Option<PacketIdentity> {
        Some(PacketIdentity {
            from: self.data.from?,
            id: self.data.id?,
        })
    }

    /// Timestamp used for aggregation: radio receive time, else local receive
    /// time, else zero. The bridge emits unpopulated fields, so a zero
    /// `rxTime` counts as absent.
    pub fn timestamp(&self) -> i64 {
        self.data
            .rx_time
            .filter(|t| *t > 0)
            .or(self.received_at)
            .unwrap_or(0)
    }
}

impl Data {
    pub fn channel(&self) -> Option<&str> {
        non_empty(self.channel_id.as_deref())
    }

    pub fn gateway(&self) -> Option<&str> {
        non_empty(self.gateway_id.as_deref())
    }

    pub fn text(&self) -> Option<&str> {
        non_empty(self.text_message.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// `(from, id)` pair that identifies redelivered copies of the same packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketIdentity {
    pub from: u32,
    pub id: u32,
}

impl fmt::Display for PacketIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}_{}", self.from, self.id)
    }
}

/// Meshtastic node id in its canonical `!xxxxxxxx` form
pub fn node_id_hex(node_id: u32) -> String {
    format!("!{:08x}", node_id)
}

/// Parse a `!xxxxxxxx` gateway/node id. Zero padding is optional.
pub fn parse_node_id(id: &str) -> Option<u32> {
    let hex = id.strip_prefix('!')?;
    if hex.is_empty() || hex.len() > 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Application port a payload was sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortNum {
    UnknownApp,
    TextMessageApp,
    RemoteHardwareApp,
    PositionApp,
    NodeinfoApp,
    RoutingApp,
    AdminApp,
    TextMessageCompressedApp,
    WaypointApp,
    AudioApp,
    DetectionSensorApp,
    AlertApp,
    ReplyApp,
    IpTunnelApp,
    PaxcounterApp,
    SerialApp,
    StoreForwardApp,
    RangeTestApp,
    TelemetryApp,
    ZpsApp,
    SimulatorApp,
    TracerouteApp,
    NeighborinfoApp,
    AtakPlugin,
    MapReportApp,
    PowerstressApp,
    ReticulumTunnelApp,
    PrivateApp,
    AtakForwarder,
    /// Port number this build does not know about
    Unknown(i32),
}

const PORT_NAMES: &[(PortNum, i32, &str)] = &[
    (PortNum::UnknownApp, 0, "UNKNOWN_APP"),
    (PortNum::TextMessageApp, 1, "TEXT_MESSAGE_APP"),
    (PortNum::RemoteHardwareApp, 2, "REMOTE_HARDWARE_APP"),
    (PortNum::PositionApp, 3, "POSITION_APP"),
    (PortNum::NodeinfoApp, 4, "NODEINFO_APP"),
    (PortNum::RoutingApp, 5, "ROUTING_APP"),
    (PortNum::AdminApp, 6, "ADMIN_APP"),
    (PortNum::TextMessageCompressedApp, 7, "TEXT_MESSAGE_COMPRESSED_APP"),
    (PortNum::WaypointApp, 8, "WAYPOINT_APP"),
    (PortNum::AudioApp, 9, "AUDIO_APP"),
    (PortNum::DetectionSensorApp, 10, "DETECTION_SENSOR_APP"),
    (PortNum::AlertApp, 11, "ALERT_APP"),
    (PortNum::ReplyApp, 32, "REPLY_APP"),
    (PortNum::IpTunnelApp, 33, "IP_TUNNEL_APP"),
    (PortNum::PaxcounterApp, 34, "PAXCOUNTER_APP"),
    (PortNum::SerialApp, 64, "SERIAL_APP"),
    (PortNum::StoreForwardApp, 65, "STORE_FORWARD_APP"),
    (PortNum::RangeTestApp, 66, "RANGE_TEST_APP"),
    (PortNum::TelemetryApp, 67, "TELEMETRY_APP"),
    (PortNum::ZpsApp, 68, "ZPS_APP"),
    (PortNum::SimulatorApp, 69, "SIMULATOR_APP"),
    (PortNum::TracerouteApp, 70, "TRACEROUTE_APP"),
    (PortNum::NeighborinfoApp, 71, "NEIGHBORINFO_APP"),
    (PortNum::AtakPlugin, 72, "ATAK_PLUGIN"),
    (PortNum::MapReportApp, 73, "MAP_REPORT_APP"),
    (PortNum::PowerstressApp, 74, "POWERSTRESS_APP"),
    (PortNum::ReticulumTunnelApp, 76, "RETICULUM_TUNNEL_APP"),
    (PortNum::PrivateApp, 256, "PRIVATE_APP"),
    (PortNum::AtakForwarder, 257, "ATAK_FORWARDER"),
];

impl PortNum {
    pub fn from_number(value: i32) -> Self {
        PORT_NAMES
            .iter()
            .find(|(_, n, _)| *n == value)
            .map(|(port, _, _)| *port)
            .unwrap_or(PortNum::Unknown(value))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PORT_NAMES
            .iter()
            .find(|(_, _, s)| *s == name)
            .map(|(port, _, _)| *port)
    }

    pub fn number(&self) -> i32 {
        match self {
            PortNum::Unknown(n) => *n,
            known => PORT_NAMES
                .iter()
                .find(|(port, _, _)| port == known)
                .map(|(_, n, _)| *n)
                .unwrap_or_default(),
        }
    }

    /// Protobuf enum name, e.g. `TEXT_MESSAGE_APP`
    pub fn name(&self) -> &'static str {
        PORT_NAMES
            .iter()
            .find(|(port, _, _)| port == self)
            .map(|(_, _, s)| *s)
            .unwrap_or("UNKNOWN")
    }
}

impl fmt::Display for PortNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortNum::Unknown(n) => write!(f, "UNKNOWN({})", n),
            known => f.write_str(known.name()),
        }
    }
}

impl Serialize for PortNum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PortNum::Unknown(n) => serializer.serialize_i32(*n),
            known => serializer.serialize_str(known.name()),
        }
    }
}

impl<'de> Deserialize<'de> for PortNum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPort {
            Number(i32),
            Name(String),
        }

        match RawPort::deserialize(deserializer)? {
            RawPort::Number(n) => Ok(PortNum::from_number(n)),
            // Names newer than this table must not make the whole packet unreadable
            RawPort::Name(name) => Ok(PortNum::from_name(&name).unwrap_or(PortNum::Unknown(-1))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub latitude_i: Option<i32>,
    pub longitude_i: Option<i32>,
    pub altitude: Option<i32>,
    pub time: Option<i64>,
    pub location_source: Option<String>,
    pub ground_speed: Option<u32>,
    pub ground_track: Option<u32>,
    pub sats_in_view: Option<u32>,
    pub precision_bits: Option<u32>,
}

impl Position {
    /// Decimal degrees, if both coordinates are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((
            f64::from(self.latitude_i?) * 1e-7,
            f64::from(self.longitude_i?) * 1e-7,
        ))
    }
}

/// NODEINFO_APP payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub macaddr: Option<String>,
    pub hw_model: Option<String>,
    pub is_licensed: Option<bool>,
    pub role: Option<String>,
    pub public_key: Option<String>,
    pub battery_level: Option<u32>,
    pub snr: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    pub time: Option<i64>,
    pub device_metrics: Option<DeviceMetrics>,
    pub environment_metrics: Option<EnvironmentMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceMetrics {
    pub battery_level: Option<u32>,
    pub voltage: Option<f32>,
    pub channel_utilization: Option<f32>,
    pub air_util_tx: Option<f32>,
    pub uptime_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentMetrics {
    pub temperature: Option<f32>,
    pub relative_humidity: Option<f32>,
    pub barometric_pressure: Option<f32>,
    pub gas_resistance: Option<f32>,
    pub voltage: Option<f32>,
    pub current: Option<f32>,
    pub iaq: Option<u32>,
    pub distance: Option<f32>,
    pub lux: Option<f32>,
    pub wind_direction: Option<u32>,
    pub wind_speed: Option<f32>,
}

/// MAP_REPORT_APP payload, published periodically by MQTT gateways
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapReport {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub role: Option<String>,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    pub region: Option<String>,
    pub modem_preset: Option<String>,
    pub has_default_channel: Option<bool>,
    pub latitude_i: Option<i32>,
    pub longitude_i: Option<i32>,
    pub altitude: Option<i32>,
    pub position_precision: Option<u32>,
    pub num_online_local_nodes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_protojson_packet() {
        let raw = r#"{
            "info": {"fullTopic": "msh/US/2/e/LongFast/!abcd1234", "channel": "LongFast", "userId": "!abcd1234"},
            "data": {
                "channelId": "LongFast",
                "gatewayId": "!abcd1234",
                "id": 3054217829,
                "from": 2882400820,
                "to": 4294967295,
                "hopLimit": 3,
                "portNum": "TEXT_MESSAGE_APP",
                "textMessage": "hello mesh",
                "someFutureField": {"nested": true}
            }
        }"#;

        let packet: Packet = serde_json::from_str(raw).unwrap();
        assert_eq!(packet.info.channel.as_deref(), Some("LongFast"));
        assert_eq!(packet.data.from, Some(0xabcd_1234));
        assert_eq!(packet.data.port_num, Some(PortNum::TextMessageApp));
        assert_eq!(packet.data.text(), Some("hello mesh"));
        assert_eq!(packet.received_at, None);
    }

    #[test]
    fn test_port_num_accepts_numbers() {
        let data: Data = serde_json::from_str(r#"{"portNum": 67}"#).unwrap();
        assert_eq!(data.port_num, Some(PortNum::TelemetryApp));

        let data: Data = serde_json::from_str(r#"{"portNum": 999}"#).unwrap();
        assert_eq!(data.port_num, Some(PortNum::Unknown(999)));
        assert_eq!(data.port_num.unwrap().number(), 999);

        let data: Data = serde_json::from_str(r#"{"portNum": "BRAND_NEW_APP"}"#).unwrap();
        assert_eq!(data.port_num, Some(PortNum::Unknown(-1)));
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let data: Data =
            serde_json::from_str(r#"{"channelId": "", "gatewayId": "", "textMessage": ""}"#)
                .unwrap();
        assert_eq!(data.channel(), None);
        assert_eq!(data.gateway(), None);
        assert_eq!(data.text(), None);
    }

    #[test]
    fn test_identity_requires_from_and_id() {
        let mut packet = Packet::default();
        assert_eq!(packet.identity(), None);

        packet.data.from = Some(1);
        assert_eq!(packet.identity(), None);

        packet.data.id = Some(5);
        let identity = packet.identity().unwrap();
        assert_eq!(identity.to_string(), "00000001_5");
    }

    #[test]
    fn test_identity_distinguishes_senders() {
        let a = PacketIdentity { from: 0x1, id: 0x12 };
        let b = PacketIdentity { from: 0x11, id: 0x2 };
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_parse_node_id() {
        assert_eq!(parse_node_id("!00000002"), Some(2));
        assert_eq!(parse_node_id("!2"), Some(2));
        assert_eq!(parse_node_id("!abcd1234"), Some(0xabcd_1234));
        assert_eq!(parse_node_id("abcd1234"), None);
        assert_eq!(parse_node_id("!"), None);
        assert_eq!(parse_node_id("!123456789"), None);
        assert_eq!(parse_node_id("!+1"), None);
        assert_eq!(parse_node_id("!-1"), None);
        assert_eq!(node_id_hex(2), "!00000002");
    }

    #[test]
    fn test_timestamp_prefers_rx_time() {
        let mut packet = Packet {
            received_at: Some(2000),
            ..Default::default()
        };
        assert_eq!(packet.timestamp(), 2000);

        packet.data.rx_time = Some(1000);
        assert_eq!(packet.timestamp(), 1000);

        packet.data.rx_time = Some(0);
        assert_eq!(packet.timestamp(), 2000);
    }
}
