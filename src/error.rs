use std::time::Duration;

use thiserror::Error;

/// Failures reported by the stream client through its error callback.
///
/// Everything except `Exhausted` is recoverable; the client schedules a
/// reconnect after reporting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Stream read failed: {0}")]
    Transport(String),

    #[error("Stream closed by server")]
    Closed,

    #[error("No data received for {}s", .0.as_secs())]
    IdleTimeout(Duration),

    #[error("Giving up after {attempts} consecutive failed attempts")]
    Exhausted { attempts: u32 },
}

impl StreamError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Connect { .. } => "connect",
            StreamError::Status(_) => "status",
            StreamError::Transport(_) => "transport",
            StreamError::Closed => "closed",
            StreamError::IdleTimeout(_) => "idle_timeout",
            StreamError::Exhausted { .. } => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::Exhausted { .. })
    }
}
