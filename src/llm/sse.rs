//! Incremental parser for the provider's server-sent event stream.
//!
//! Works on raw bytes so multi-byte UTF-8 sequences split across network
//! chunks are reassembled before decoding.

/// A parsed upstream SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type from the `event:` line, if present.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Buffers partial input and emits complete events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    ///
    /// Carriage returns are discarded, so `\r\n` line endings parse the same
    /// as `\n`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_event(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    fn parse_event(text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_parts = Vec::new();

        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim().to_owned());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_parts.push(value.strip_prefix(' ').unwrap_or(value));
            }
            // comment lines (`:`) and unknown fields are ignored
        }

        if data_parts.is_empty() {
            return None;
        }

        Some(SseEvent {
            event: event_type,
            data: data_parts.join("\n"),
        })
    }

    /// Returns `true` if a partial event is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}
