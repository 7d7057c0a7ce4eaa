//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value}")]
    InvalidContentLength { value: String },
}

/// A parsed HTTP/1.1 request.
///
/// [`Request::parse`] only consumes the head; the connection loop attaches the
/// body with [`Request::with_body`] once `Content-Length` bytes have arrived.
///
/// # Examples
///
/// ```
/// use ai_relay::http::request::Request;
///
/// let raw = b"POST /api/ai-sdk/ask HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\n{}";
/// let (request, offset) = Request::parse(raw).unwrap();
/// let request = request.with_body(&raw[offset..]);
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/api/ai-sdk/ask");
/// assert_eq!(request.body().as_ref(), b"{}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses the request head from `buf`.
    ///
    /// Returns the request (with an empty body) and the offset at which the
    /// body begins, i.e. just past the `\r\n\r\n` terminator.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head has not fully arrived yet.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path or version is absent.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
            .unwrap_or_else(|never| match never {});

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let request = Self {
            method,
            path,
            version,
            headers: header_map,
            query,
            body: Bytes::new(),
        };
        request.content_length()?;

        Ok((request, body_offset))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl AsRef<[u8]>) -> Self {
        self.body = Bytes::copy_from_slice(body.as_ref());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the declared body length; zero when the header is absent.
    pub fn content_length(&self) -> Result<usize, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength {
                    value: value.to_owned(),
                }),
        }
    }
}
