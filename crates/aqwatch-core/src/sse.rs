//! Incremental `text/event-stream` decoder.
//!
//! Chunks from the HTTP body may split lines (or UTF-8 sequences) anywhere, so
//! bytes are buffered until a full line is available. A line (or an event's
//! accumulated data) longer than the decoder's limit is a stream error.

use crate::store::StoreError;

/// Largest line or event payload held while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    max_line_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_limit(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            event: None,
            data: Vec::new(),
            data_len: 0,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Returns every event completed by `chunk`. On overflow the partial state
    /// is discarded and the decoder can be reused.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, StoreError> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.handle_line(&line) {
                events.push(event);
            }
            if self.data_len > self.max_line_bytes {
                let len = self.data_len;
                self.reset();
                return Err(StoreError::Stream(format!(
                    "event data of {len} bytes exceeds {} byte limit",
                    self.max_line_bytes
                )));
            }
        }

        if self.buf.len() > self.max_line_bytes {
            let len = self.buf.len();
            self.reset();
            return Err(StoreError::Stream(format!(
                "unterminated line of {len} bytes exceeds {} byte limit",
                self.max_line_bytes
            )));
        }
        Ok(events)
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.event = None;
        self.data.clear();
        self.data_len = 0;
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
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
            "data" => {
                self.data_len += value.len();
                self.data.push(value.to_string());
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        self.data_len = 0;
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
