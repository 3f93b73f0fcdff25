use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use super::sse::{SseDecoder, SseFrame};
use crate::error::StreamError;

/// Frames of one open connection. The stream ends when the server closes
/// the body cleanly.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send>>;

/// Opens server-push connections. The HTTP implementation is the only one
/// used in production; tests script their own.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<FrameStream, StreamError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, endpoint: &str) -> Result<FrameStream, StreamError> {
        let response = self
            .client
            .get(endpoint)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| StreamError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }
        debug!("SSE response from {}: {}", endpoint, status);

        let body = Box::pin(response.bytes_stream());
        let frames = futures_util::stream::unfold(
            (body, SseDecoder::new(), VecDeque::new()),
            |(mut body, mut decoder, mut ready)| async move {
                loop {
                    if let Some(frame) = ready.pop_front() {
                        return Some((Ok(frame), (body, decoder, ready)));
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => ready.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            let error = StreamError::Transport(e.to_string());
                            return Some((Err(error), (body, decoder, ready)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(frames))
    }
}
