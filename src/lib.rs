//! meshstream - resilient Meshtastic packet stream client
//!
//! Connects to an MQTT bridge's server-sent event stream, survives
//! disconnects with exponential backoff, and folds every decoded packet into
//! a deduplicated, memory-bounded model of the mesh: nodes, gateways,
//! channels and per-channel text messages.

pub mod activity;
pub mod aggregator;
pub mod config;
pub mod connection_info;
pub mod dedup;
pub mod error;
pub mod log_format;
pub mod metrics;
pub mod ordered_set;
pub mod packet;
pub mod packet_log;
pub mod pipeline;
pub mod replay;
pub mod stream;

pub use aggregator::{Aggregator, FoldOutcome, MeshState, MeshSummary};
pub use config::MeshstreamConfig;
pub use connection_info::{ConnectionInfo, ConnectionInfoTracker};
pub use error::StreamError;
pub use packet::{Packet, PacketIdentity, PortNum};
pub use packet_log::PacketLog;
pub use pipeline::EventPipeline;
pub use stream::{
    StreamClient, StreamClientConfig, StreamClientConfigBuilder, StreamEvent, StreamHandle,
    StreamState,
};
