//! Server-sent event frames and their wire encoding.
//!
//! Every frame is one SSE event of the form `data: <payload>\n\n`. Payloads
//! are JSON, so a fragment containing newlines is escaped inside the string
//! literal and never produces a blank line before the event terminator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal payload of the terminal sentinel.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";
const EVENT_TERMINATOR: &str = "\n\n";

/// Errors produced when reading a frame back from its wire form.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("event does not start with `data: `")]
    MissingDataPrefix,

    #[error("event is not terminated by a blank line")]
    Unterminated,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload matches no known frame shape")]
    UnknownPayload,
}

/// A UI message stream part, used by the chat endpoint.
///
/// These are the lifecycle markers the browser chat hook understands, one
/// JSON object per event, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiChunk {
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Finish,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

/// One discrete unit of the output event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `{"text": <fragment>}`
    Text(String),
    /// `{"error": <message>}`
    Error(String),
    /// The literal `[DONE]` sentinel.
    Done,
    /// A chat lifecycle part, serialized as-is.
    Chunk(UiChunk),
}

#[derive(Serialize)]
struct TextPayload<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

impl Frame {
    /// Returns `true` for frames that end a stream: the sentinel and both error shapes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error(_) | Self::Chunk(UiChunk::Error { .. })
        )
    }

    /// Encodes the frame as a complete SSE event.
    ///
    /// # Examples
    ///
    /// ```
    /// use ai_relay::realtime::Frame;
    ///
    /// let bytes = Frame::Text("line one\nline two".into()).encode().unwrap();
    /// assert_eq!(&bytes[..], b"data: {\"text\":\"line one\\nline two\"}\n\n");
    /// assert_eq!(&Frame::Done.encode().unwrap()[..], b"data: [DONE]\n\n");
    /// ```
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let payload = match self {
            Self::Text(text) => serde_json::to_string(&TextPayload { text })?,
            Self::Error(error) => serde_json::to_string(&ErrorPayload { error })?,
            Self::Done => DONE_SENTINEL.to_owned(),
            Self::Chunk(chunk) => serde_json::to_string(chunk)?,
        };
        Ok(Bytes::from(format!(
            "{DATA_PREFIX}{payload}{EVENT_TERMINATOR}"
        )))
    }

    /// Parses one event block as produced by [`encode`](Self::encode).
    pub fn decode(event: &str) -> Result<Self, FrameError> {
        let body = event
            .strip_suffix(EVENT_TERMINATOR)
            .ok_or(FrameError::Unterminated)?;
        let payload = body
            .strip_prefix(DATA_PREFIX)
            .ok_or(FrameError::MissingDataPrefix)?;

        if payload == DONE_SENTINEL {
            return Ok(Self::Done);
        }

        let value: serde_json::Value = serde_json::from_str(payload)?;
        if let Some(text) = value.get("text").and_then(serde_json::Value::as_str) {
            return Ok(Self::Text(text.to_owned()));
        }
        if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
            return Ok(Self::Error(error.to_owned()));
        }
        if value.get("type").is_some() {
            return Ok(Self::Chunk(serde_json::from_value(value)?));
        }
        Err(FrameError::UnknownPayload)
    }
}

/// Splits a raw SSE body into its event blocks, each including the trailing blank line.
pub fn split_events(body: &str) -> impl Iterator<Item = &str> {
    body.split_inclusive(EVENT_TERMINATOR)
        .filter(|block| block.ends_with(EVENT_TERMINATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame: &Frame) -> String {
        String::from_utf8(frame.encode().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn text_frame_shape() {
        assert_eq!(wire(&Frame::Text("1".into())), "data: {\"text\":\"1\"}\n\n");
    }

    #[test]
    fn error_frame_shape() {
        assert_eq!(
            wire(&Frame::Error("Stream error".into())),
            "data: {\"error\":\"Stream error\"}\n\n"
        );
    }

    #[test]
    fn newline_fragment_stays_one_event() {
        let fragment = "first\n\nsecond\r\n";
        let encoded = wire(&Frame::Text(fragment.into()));

        // exactly one blank-line boundary, at the very end
        assert_eq!(encoded.matches("\n\n").count(), 1);
        assert!(!encoded.trim_end_matches('\n').contains('\n'));

        assert_eq!(Frame::decode(&encoded).unwrap(), Frame::Text(fragment.into()));
    }

    #[test]
    fn sentinel_round_trip() {
        assert_eq!(Frame::decode("data: [DONE]\n\n").unwrap(), Frame::Done);
    }

    #[test]
    fn ui_chunks_use_kebab_case_tags() {
        let delta = Frame::Chunk(UiChunk::TextDelta {
            id: "t1".into(),
            delta: "Hi".into(),
        });
        assert_eq!(
            wire(&delta),
            "data: {\"type\":\"text-delta\",\"id\":\"t1\",\"delta\":\"Hi\"}\n\n"
        );

        let start = Frame::Chunk(UiChunk::Start {
            message_id: "m1".into(),
        });
        assert_eq!(wire(&start), "data: {\"type\":\"start\",\"messageId\":\"m1\"}\n\n");

        let err = Frame::Chunk(UiChunk::Error {
            error_text: "Stream error".into(),
        });
        assert_eq!(
            wire(&err),
            "data: {\"type\":\"error\",\"errorText\":\"Stream error\"}\n\n"
        );
        assert_eq!(Frame::decode(&wire(&err)).unwrap(), err);
    }

    #[test]
    fn terminal_classification() {
        assert!(Frame::Done.is_terminal());
        assert!(Frame::Error(String::new()).is_terminal());
        assert!(!Frame::Text(String::new()).is_terminal());
        assert!(!Frame::Chunk(UiChunk::Finish).is_terminal());
    }

    #[test]
    fn decode_rejects_malformed_events() {
        assert!(matches!(
            Frame::decode("event: x\n\n"),
            Err(FrameError::MissingDataPrefix)
        ));
        assert!(matches!(
            Frame::decode("data: [DONE]"),
            Err(FrameError::Unterminated)
        ));
        assert!(matches!(
            Frame::decode("data: {\"other\":1}\n\n"),
            Err(FrameError::UnknownPayload)
        ));
    }

    #[test]
    fn split_events_ignores_trailing_partial() {
        let body = "data: {\"text\":\"a\"}\n\ndata: [DONE]\n\ndata: par";
        let events: Vec<_> = split_events(body).collect();
        assert_eq!(events, vec!["data: {\"text\":\"a\"}\n\n", "data: [DONE]\n\n"]);
    }
}
