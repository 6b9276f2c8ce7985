//! Incremental Server-Sent Events decoding for run streams.

use crate::{StreamChunk, ThreadClientError};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty() && self.id.is_none()
    }
}

/// Line-oriented SSE parser fed with raw body bytes.
///
/// Bytes that end mid UTF-8 sequence are held back until the next push.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending_bytes: Vec<u8>,
    buffer: String,
    current: SseEvent,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending_bytes.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.pending_bytes) {
            Ok(text) => text.len(),
            Err(error) => error.valid_up_to(),
        };
        let decoded = String::from_utf8_lossy(&self.pending_bytes[..valid_up_to]).into_owned();
        self.pending_bytes.drain(..valid_up_to);
        self.push_str(&decoded)
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(event) = self.accept_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event when the body ends without a blank line.
    pub fn finish(mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            if let Some(event) = self.accept_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        if self.current.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    fn accept_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.current.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.current));
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            "id" => self.current.id = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

/// Maps a decoded event onto a run chunk. `error` events become stream failures;
/// events without data are dropped.
pub fn chunk_from_event(event: SseEvent) -> Option<Result<StreamChunk, ThreadClientError>> {
    let name = event.event.unwrap_or_else(|| "message".to_string());
    if event.data.is_empty() {
        return None;
    }
    if name == "error" {
        return Some(Err(ThreadClientError::Stream(event.data)));
    }
    Some(
        serde_json::from_str::<Value>(&event.data)
            .map(|data| StreamChunk { event: name, data })
            .map_err(|error| ThreadClientError::Decode(format!("{error}: {}", event.data))),
    )
}
