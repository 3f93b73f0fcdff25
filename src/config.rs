use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::packet_log::DEFAULT_PACKET_LOG_CAPACITY;
use crate::stream::{DEFAULT_ENDPOINT, StreamClientConfig, StreamClientConfigBuilder};

/// Top-level `meshstream.toml` structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshstreamConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub packet_log: PacketLogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLogConfig {
    pub capacity: usize,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let defaults = StreamClientConfig::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_attempts: defaults.max_attempts,
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
        }
    }
}

impl Default for PacketLogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PACKET_LOG_CAPACITY,
        }
    }
}

impl Default for MeshstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            reconnect: ReconnectConfig::default(),
            packet_log: PacketLogConfig::default(),
        }
    }
}

impl MeshstreamConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: MeshstreamConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the resolved default location, else
    /// built-in defaults. `MESHSTREAM_ENDPOINT` overrides the file.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(config_path) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };

        if let Ok(endpoint) = std::env::var("MESHSTREAM_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config.endpoint = endpoint.trim().to_string();
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            anyhow::bail!("endpoint must not be empty");
        }
        if self.reconnect.max_attempts == 0 {
            anyhow::bail!("reconnect.max_attempts must be at least 1");
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            anyhow::bail!(
                "reconnect.initial_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.initial_delay_ms,
                self.reconnect.max_delay_ms
            );
        }
        if self.packet_log.capacity == 0 {
            anyhow::bail!("packet_log.capacity must be at least 1");
        }
        Ok(())
    }

    pub fn stream_client_config(&self) -> StreamClientConfig {
        StreamClientConfigBuilder::new()
            .endpoint(&self.endpoint)
            .initial_delay(Duration::from_millis(self.reconnect.initial_delay_ms))
            .max_delay(Duration::from_millis(self.reconnect.max_delay_ms))
            .max_attempts(self.reconnect.max_attempts)
            .idle_timeout(Duration::from_secs(self.reconnect.idle_timeout_secs))
            .build()
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `MESHSTREAM_CONFIG` env var
/// 2. `./meshstream.toml` if it exists
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MESHSTREAM_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from("./meshstream.toml");
    local.exists().then_some(local)
}
