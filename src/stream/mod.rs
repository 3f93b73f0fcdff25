//! Resilient SSE client for the mesh bridge's `/api/stream` endpoint.
//!
//! One connection at a time. Transport failures are reported through the
//! error callback and followed by an exponential-backoff reconnect until the
//! attempt budget runs out.

mod backoff;
mod dispatch;
mod event;
mod sse;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use backoff::Backoff;
pub use event::{StreamEvent, StreamState};
pub use sse::{SseDecoder, SseFrame};
pub use transport::{FrameStream, HttpTransport, Transport};

use crate::error::StreamError;
use dispatch::Dispatcher;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/stream";

/// Configuration for the stream client
#[derive(Debug, Clone, PartialEq)]
pub struct StreamClientConfig {
    /// Full URL of the SSE endpoint
    pub endpoint: String,
    /// Delay before the first reconnect; doubles on every further failure
    pub initial_delay: Duration,
    /// Cap for the reconnect delay
    pub max_delay: Duration,
    /// Consecutive failures after which reconnecting stops
    pub max_attempts: u32,
    /// Connection is considered dead when no frame arrives for this long
    pub idle_timeout: Duration,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 30,
            // Bridge heartbeats every 30 seconds
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl StreamClientConfig {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.max_delay, self.max_attempts)
    }
}

/// Builder pattern for creating stream client configurations
pub struct StreamClientConfigBuilder {
    config: StreamClientConfig,
}

impl StreamClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StreamClientConfig::default(),
        }
    }

    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    pub fn build(self) -> StreamClientConfig {
        self.config
    }
}

impl Default for StreamClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StreamClient<T: Transport = HttpTransport> {
    config: StreamClientConfig,
    transport: Arc<T>,
}

impl StreamClient<HttpTransport> {
    pub fn new(config: StreamClientConfig) -> Self {
        Self::with_transport(config, HttpTransport::new())
    }
}

impl<T: Transport> StreamClient<T> {
    pub fn with_transport(config: StreamClientConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &StreamClientConfig {
        &self.config
    }

    /// Start streaming on the current tokio runtime.
    ///
    /// Callbacks run on the stream task, one at a time, in transport order.
    /// The returned handle stops the stream when `stop` is called or when it
    /// is dropped. After exhaustion `start` may be called again.
    pub fn start<E, F>(&self, on_event: E, on_error: F) -> StreamHandle
    where
        E: FnMut(StreamEvent) + Send + 'static,
        F: FnMut(StreamError) + Send + 'static,
    {
        let dispatcher = Arc::new(Dispatcher::new(Box::new(on_event), Box::new(on_error)));
        let cancel = CancellationToken::new();
        let state = dispatcher.subscribe();

        info!("Starting stream client for {}", self.config.endpoint);

        let task = tokio::spawn(run_stream(
            self.config.clone(),
            self.transport.clone(),
            dispatcher.clone(),
            cancel.clone(),
        ));

        StreamHandle {
            dispatcher,
            cancel,
            task,
            state,
        }
    }
}

/// Disposer for a running stream
pub struct StreamHandle {
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<StreamState>,
}

impl StreamHandle {
    /// Stop the stream permanently. No callback fires once this returns,
    /// including when it is called from inside a callback. Idempotent.
    ///
    /// Called from outside a callback, this blocks until a callback running
    /// on another thread returns. Do not call it while holding a lock that
    /// the callbacks also take.
    pub fn stop(&self) {
        if self.dispatcher.is_closed() {
            return;
        }
        info!("Stopping stream client");
        self.dispatcher.close();
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Receiver that observes every state transition, including `Closed`
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Wait until the stream reaches a terminal state
    pub async fn finished(&self) -> StreamState {
        let mut receiver = self.state.clone();
        match receiver.wait_for(StreamState::is_terminal).await {
            Ok(current) => *current,
            Err(_) => StreamState::Closed,
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_stream<T: Transport>(
    config: StreamClientConfig,
    transport: Arc<T>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    let mut backoff = config.backoff();

    loop {
        if backoff.attempt() == 0 {
            info!("Connecting to {}", config.endpoint);
        } else {
            info!(
                "Reconnecting to {} (retry attempt {})",
                config.endpoint,
                backoff.attempt()
            );
        }
        dispatcher.set_state(StreamState::Connecting);

        let failure = tokio::select! {
            _ = cancel.cancelled() => return,
            failure = connect_and_run(&config, transport.as_ref(), &dispatcher, &mut backoff) => failure,
        };

        warn!("Stream from {} failed: {}", config.endpoint, failure);
        metrics::counter!("stream.connection_failed_total", "kind" => failure.kind()).increment(1);
        dispatcher.error(failure);

        match backoff.record_failure() {
            Some(delay) => {
                info!("Waiting {:.1} seconds before retry", delay.as_secs_f64());
                dispatcher.set_state(StreamState::Reconnecting {
                    attempt: backoff.attempt(),
                    delay,
                });
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                let attempts = backoff.attempt();
                error!(
                    "Giving up on {} after {} consecutive failures",
                    config.endpoint, attempts
                );
                metrics::counter!("stream.exhausted_total").increment(1);
                dispatcher.set_state(StreamState::Exhausted);
                dispatcher.error(StreamError::Exhausted { attempts });
                return;
            }
        }
    }
}

/// Open one connection and pump its frames until it fails. Always returns
/// the failure that ended the connection.
async fn connect_and_run<T: Transport>(
    config: &StreamClientConfig,
    transport: &T,
    dispatcher: &Dispatcher,
    backoff: &mut Backoff,
) -> StreamError {
    let connect = timeout(config.idle_timeout, transport.connect(&config.endpoint)).await;
    let mut frames = match connect {
        Ok(Ok(frames)) => frames,
        Ok(Err(e)) => return e,
        Err(_) => return StreamError::IdleTimeout(config.idle_timeout),
    };

    info!("Connected to {}", config.endpoint);
    metrics::counter!("stream.connected_total").increment(1);
    dispatcher.set_state(StreamState::Open);

    loop {
        let frame = match timeout(config.idle_timeout, frames.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return e,
            Ok(None) => return StreamError::Closed,
            Err(_) => return StreamError::IdleTimeout(config.idle_timeout),
        };

        let received_at = chrono::Utc::now().timestamp();
        let Some(event) = StreamEvent::from_frame(frame, received_at) else {
            continue;
        };

        if event.restores_connectivity() && backoff.attempt() > 0 {
            debug!("Upstream reports connectivity, resetting retry counter");
            backoff.reset();
        }
        metrics::counter!("stream.events_total", "event" => event.kind()).increment(1);
        dispatcher.event(event);
    }
}
