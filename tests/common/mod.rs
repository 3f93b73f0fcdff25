//! Shared fixtures for integration tests
//!
//! - `PacketBuilder` for bridge packets
//! - `ScriptedTransport`, a `Transport` whose connections follow a script
//! - `SseServer`, a minimal HTTP/1.1 server for exercising the real transport

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use meshstream::packet::Packet;
use meshstream::stream::{FrameStream, SseFrame, Transport};
use meshstream::StreamError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct PacketBuilder {
    packet: Packet,
}

impl PacketBuilder {
    pub fn new(from: u32, id: u32) -> Self {
        let mut packet = Packet::default();
        packet.data.from = Some(from);
        packet.data.id = Some(id);
        Self { packet }
    }

    pub fn rx_time(mut self, rx_time: i64) -> Self {
        self.packet.data.rx_time = Some(rx_time);
        self
    }

    pub fn channel(mut self, channel_id: &str) -> Self {
        self.packet.data.channel_id = Some(channel_id.to_string());
        self
    }

    pub fn gateway(mut self, gateway_id: &str) -> Self {
        self.packet.data.gateway_id = Some(gateway_id.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.packet.data.text_message = Some(text.to_string());
        self
    }

    pub fn build(self) -> Packet {
        self.packet
    }
}

pub fn frame(event: &str, data: &str) -> SseFrame {
    SseFrame {
        event: Some(event.to_string()),
        data: data.to_string(),
        ..Default::default()
    }
}

pub fn message_json(from: u32, id: u32) -> String {
    format!(
        r#"{{"info":{{"channel":"LongFast"}},"data":{{"from":{},"id":{},"channelId":"LongFast","portNum":"TEXT_MESSAGE_APP","textMessage":"hello {}"}}}}"#,
        from, id, id
    )
}

/// What a single connect attempt does
pub enum Script {
    /// Fail to connect
    Refuse,
    /// Deliver frames, then close (`hang == false`) or stay open silently
    Serve { frames: Vec<SseFrame>, hang: bool },
    /// Deliver an `info` frame every `interval`, forever
    Ticker { interval: Duration },
}

pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    /// Attempts beyond the end of the script are refused
    pub fn new(scripts: Vec<Script>) -> (Self, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        (
            Self {
                scripts: Mutex::new(scripts.into()),
                connects: connects.clone(),
            },
            connects,
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, endpoint: &str) -> Result<FrameStream, StreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        let stream: FrameStream = match script {
            Script::Refuse => {
                return Err(StreamError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Script::Serve { frames, hang } => {
                let frames = futures_util::stream::iter(frames.into_iter().map(Ok));
                if hang {
                    Box::pin(frames.chain(futures_util::stream::pending()))
                } else {
                    Box::pin(frames)
                }
            }
            Script::Ticker { interval } => Box::pin(futures_util::stream::unfold(
                0u64,
                move |n| async move {
                    tokio::time::sleep(interval).await;
                    Some((Ok(frame("info", &format!("tick {}", n))), n + 1))
                },
            )),
        };
        Ok(stream)
    }
}

/// Poll `condition` every few milliseconds; panics after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5 seconds"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn sse_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n{}",
        body
    )
}

pub fn status_response(status: u16, reason: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )
}

/// Serves one canned response per connection, in order, closing the socket
/// after each. Connections beyond the list get a 503.
pub struct SseServer {
    pub endpoint: String,
    pub connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SseServer {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();
        let mut responses: VecDeque<String> = responses.into();

        let task = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let response = responses
                    .pop_front()
                    .unwrap_or_else(|| status_response(503, "Service Unavailable"));

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            endpoint: format!("http://{}/api/stream", addr),
            connections,
            task,
        }
    }
}

impl Drop for SseServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
