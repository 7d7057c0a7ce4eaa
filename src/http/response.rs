//! HTTP/1.1 response builder.
//!
//! Responses carry either a complete body, written with `Content-Length`, or a
//! streamed body fed through a channel and written with
//! `Transfer-Encoding: chunked`. The streamed form is what the SSE endpoints use.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::mpsc;

use super::{Headers, StatusCode};

/// Terminating chunk of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// A response body.
#[derive(Debug)]
pub enum Body {
    /// A fully buffered body.
    Full(Vec<u8>),
    /// A body produced incrementally; the stream ends when every sender is dropped.
    Stream(mpsc::Receiver<Bytes>),
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use ai_relay::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Ok, &serde_json::json!({"data": {"text": "Paris"}}));
/// let (head, stream) = response.into_wire();
/// let text = std::str::from_utf8(&head).unwrap();
/// assert!(stream.is_none());
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with(r#"{"data":{"text":"Paris"}}"#));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Full(Vec::new()),
            keep_alive: true,
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// Falls back to a bare `500` if serialization fails, which only happens
    /// for values with non-string map keys.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json; charset=utf-8")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON response");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// Builds the JSON error body every non-2xx answer uses:
    /// `{"data": null, "error": {"status", "name", "message"}}`.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &serde_json::json!({
                "data": null,
                "error": {
                    "status": status.as_u16(),
                    "name": status.error_name(),
                    "message": message.into(),
                }
            }),
        )
    }

    /// Creates a `200 text/event-stream` response whose body is fed by `rx`.
    ///
    /// Each item received is written as one chunk; the response completes
    /// when the sending half is dropped.
    pub fn event_stream(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Headers::new(),
            body: Body::Stream(rx),
            keep_alive: true,
        }
        .header("Content-Type", "text/event-stream; charset=utf-8")
        .header("Cache-Control", "no-cache, no-transform")
        .header("X-Accel-Buffering", "no")
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets a plain-text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Full(body.into().into_bytes());
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Returns the buffered body, or `None` for streamed responses.
    pub fn body_ref(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    /// Returns `true` if the connection may be reused after this response.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serializes the response for the wire.
    ///
    /// For a full body the returned buffer holds the head and the body, with
    /// `Content-Length` set. For a streamed body it holds the head only, with
    /// `Transfer-Encoding: chunked`, and the receiver is handed back so the
    /// connection can forward each item with [`encode_chunk`].
    pub fn into_wire(mut self) -> (BytesMut, Option<mpsc::Receiver<Bytes>>) {
        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let (body, stream) = match self.body {
            Body::Full(body) => {
                if !body.is_empty() && !self.headers.contains("content-type") {
                    self.headers
                        .insert("Content-Type", "text/plain; charset=utf-8");
                }
                self.headers
                    .set("Content-Length", body.len().to_string());
                (body, None)
            }
            Body::Stream(rx) => {
                self.headers.remove("content-length");
                self.headers.set("Transfer-Encoding", "chunked");
                (Vec::new(), Some(rx))
            }
        };

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + body.len());
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        buf.put(self.headers.to_string().as_bytes());
        buf.put(&b"\r\n"[..]);
        buf.put(body.as_slice());

        (buf, stream)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// Frames `data` as one HTTP/1.1 chunk: hex length, CRLF, data, CRLF.
pub fn encode_chunk(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(data.len() + 12);
    buf.put(format!("{:x}\r\n", data.len()).as_bytes());
    buf.put(data);
    buf.put(&b"\r\n"[..]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(r: Response) -> String {
        let (head, _) = r.into_wire();
        String::from_utf8(head.to_vec()).unwrap()
    }

    #[test]
    fn plain_body_gets_length_and_type() {
        let s = head_of(Response::new(StatusCode::Ok).body("Hello"));
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn empty_body_has_no_content_type() {
        let s = head_of(Response::new(StatusCode::NoContent));
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let s = head_of(Response::new(StatusCode::Ok).keep_alive(false));
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn json_body() {
        let r = Response::json(StatusCode::BadRequest, &serde_json::json!({"error": "x"}));
        assert_eq!(r.body_ref(), Some(&br#"{"error":"x"}"#[..]));
        let s = head_of(r);
        assert!(s.contains("Content-Type: application/json; charset=utf-8\r\n"));
    }

    #[test]
    fn error_body_shape() {
        let r = Response::error(StatusCode::BadRequest, "prompt is required");
        let body: serde_json::Value = serde_json::from_slice(r.body_ref().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "data": null,
                "error": {"status": 400, "name": "BadRequestError", "message": "prompt is required"}
            })
        );
    }

    #[test]
    fn event_stream_is_chunked_without_length() {
        let (_tx, rx) = mpsc::channel(1);
        let r = Response::event_stream(rx);
        assert!(r.is_streaming());
        let (head, stream) = r.into_wire();
        let s = String::from_utf8(head.to_vec()).unwrap();
        assert!(stream.is_some());
        assert!(s.contains("Content-Type: text/event-stream; charset=utf-8\r\n"));
        assert!(s.contains("Cache-Control: no-cache, no-transform\r\n"));
        assert!(s.contains("X-Accel-Buffering: no\r\n"));
        assert!(s.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn chunk_framing() {
        let chunk = encode_chunk(b"data: [DONE]\n\n");
        assert_eq!(&chunk[..], b"e\r\ndata: [DONE]\n\n\r\n");
    }
}
