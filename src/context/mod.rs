//! Per-request context handed to route handlers.

use serde::de::DeserializeOwned;

use crate::Request;

/// Wraps the incoming [`Request`] for the duration of one handler call.
#[derive(Debug)]
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Decodes the request body as JSON.
    ///
    /// An empty body decodes as `{}` so that handlers report a missing field
    /// rather than a syntax error.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let body = self.request.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_slice(b"{}");
        }
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Ask {
        prompt: Option<String>,
    }

    fn ctx(body: &str) -> Context {
        let raw = format!(
            "POST /ask HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (req, offset) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req.with_body(&raw.as_bytes()[offset..]))
    }

    #[test]
    fn decodes_json_body() {
        let ask: Ask = ctx(r#"{"prompt":"capital of France"}"#).json().unwrap();
        assert_eq!(ask.prompt.as_deref(), Some("capital of France"));
    }

    #[test]
    fn empty_body_is_an_empty_object() {
        let ask: Ask = ctx("").json().unwrap();
        assert!(ask.prompt.is_none());
    }

    #[test]
    fn malformed_body_errors() {
        assert!(ctx("{prompt:").json::<Ask>().is_err());
    }
}
