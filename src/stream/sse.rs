//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences split across network chunks decode correctly. Invalid UTF-8 is
//! replaced rather than rejected.

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `None` when the frame carried no `event:` field
    pub event: Option<String>,
    pub data: String,
    /// Last event id seen on the stream, if any
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    /// Event name with the SSE default applied
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_event_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and collect every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.retry = Some(retry);
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let retry = self.retry.take();
        if self.data.is_empty() {
            // A frame without data lines is not delivered
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            data,
            id: self.last_event_id.clone(),
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: info\ndata: Connected to Meshtastic stream\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "info");
        assert_eq!(frames[0].data, "Connected to Meshtastic stream");
    }

    #[test]
    fn test_default_event_name() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {}\n\n");
        assert_eq!(frames[0].event, None);
        assert_eq!(frames[0].event_name(), "message");
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: mess").is_empty());
        assert!(decoder.feed(b"age\r\ndata: {\"a\":").is_empty());
        let frames = decoder.feed(b"1}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "message");
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keepalive\nid: 7\nretry: 5000\ndata: one\ndata:two\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "one\ntwo");
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].retry, Some(5000));
    }

    #[test]
    fn test_frame_without_data_is_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: padding\n\nevent: info\ndata: hi\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "info");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let text = "data: héllo\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        assert!(decoder.feed(&text[..split]).is_empty());
        let frames = decoder.feed(&text[split..]);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\xffb\n\n");
        assert_eq!(frames[0].data, "a\u{fffd}b");
    }
}
