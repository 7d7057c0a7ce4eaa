//! Anthropic Messages API client.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::ProviderConfig;
use super::messages::{ModelMessage, Role};
use super::sse::SseParser;
use super::{GenerateInput, GenerateRequest, LlmError, TextGenerator, TextStream};

const API_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";

/// Native client for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// The subset of streaming events the relay acts on.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop {},
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

impl AnthropicClient {
    /// Builds a client whose default headers carry the API key and version.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidRequest`] if the key cannot be used as a header
    /// value, or [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(config.api_key()).map_err(|_| {
            LlmError::InvalidRequest("API key contains invalid header characters".into())
        })?;
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // no overall timeout: a streamed answer may legitimately take minutes
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!("{}{MESSAGES_PATH}", self.config.base_url())
    }

    fn build_body<'a>(&'a self, request: &'a GenerateRequest, stream: bool) -> MessagesRequest<'a> {
        let messages = match &request.input {
            GenerateInput::Prompt(prompt) => vec![WireMessage {
                role: Role::User,
                content: prompt,
            }],
            GenerateInput::Messages(messages) => messages
                .iter()
                .filter(|m: &&ModelMessage| m.role != Role::System)
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
        };

        MessagesRequest {
            model: self.config.chat_model(),
            max_tokens: request
                .max_output_tokens
                .unwrap_or(self.config.max_output_tokens()),
            messages,
            system: request.system.as_deref(),
            temperature: request.temperature.unwrap_or(self.config.temperature()),
            stream,
        }
    }

    async fn send(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut request = self.http.post(self.url()).json(body);
        if body.stream {
            request = request.header(ACCEPT, "text/event-stream");
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
            .map(|envelope| envelope.error.message)
            .unwrap_or(text);
        Err(LlmError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Generates the full response and returns its concatenated text blocks.
    pub async fn complete(&self, request: GenerateRequest) -> Result<String, LlmError> {
        let body = self.build_body(&request, false);
        debug!(model = body.model, messages = body.messages.len(), "anthropic request");

        let response = self.send(&body).await?;
        let bytes = response.bytes().await?;
        let parsed: MessagesResponse = serde_json::from_slice(&bytes)?;

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect())
    }

    /// Starts a streamed generation and yields each text delta as one fragment.
    pub async fn stream_text(&self, request: GenerateRequest) -> Result<TextStream, LlmError> {
        let body = self.build_body(&request, true);
        debug!(model = body.model, messages = body.messages.len(), "anthropic stream request");

        let response = self.send(&body).await?;
        Ok(text_deltas(response.bytes_stream().boxed()))
    }
}

impl TextGenerator for AnthropicClient {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String, LlmError>> {
        Box::pin(self.complete(request))
    }

    fn stream(&self, request: GenerateRequest) -> BoxFuture<'_, Result<TextStream, LlmError>> {
        Box::pin(self.stream_text(request))
    }

    fn model(&self) -> &str {
        self.config.chat_model()
    }
}

/// State threaded through [`text_deltas`].
struct DeltaReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    pending: VecDeque<Result<String, LlmError>>,
    stopped: bool,
    failed: bool,
}

impl DeltaReader {
    /// Parses one network chunk, queueing fragments and at most one error.
    fn absorb(&mut self, chunk: &[u8]) {
        for event in self.parser.feed(chunk) {
            match serde_json::from_str::<StreamEvent>(&event.data) {
                Ok(StreamEvent::ContentBlockDelta {
                    delta: Delta::TextDelta { text },
                }) => {
                    if !text.is_empty() {
                        self.pending.push_back(Ok(text));
                    }
                }
                Ok(StreamEvent::MessageStop {}) => {
                    self.stopped = true;
                    return;
                }
                Ok(StreamEvent::Error { error }) => {
                    self.fail(LlmError::Stream(format!("{}: {}", error.kind, error.message)));
                    return;
                }
                Ok(StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other) => {}
                Err(e) => {
                    warn!(error = %e, data = %event.data, "unparseable anthropic event");
                }
            }
        }
    }

    fn fail(&mut self, error: LlmError) {
        self.pending.push_back(Err(error));
        self.failed = true;
    }
}

/// Turns a raw SSE response body into a stream of text fragments.
///
/// The stream ends after `message_stop`. An `error` event, a transport
/// error, or end of body without `message_stop` yields one `Err` and ends it.
fn text_deltas(body: BoxStream<'static, reqwest::Result<Bytes>>) -> TextStream {
    let reader = DeltaReader {
        body,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        stopped: false,
        failed: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(item) = reader.pending.pop_front() {
                return Some((item, reader));
            }
            if reader.stopped || reader.failed {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(chunk)) => reader.absorb(&chunk),
                Some(Err(e)) => reader.fail(LlmError::Http(e)),
                None => reader.fail(LlmError::Stream(
                    "response ended before message_stop".into(),
                )),
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        let config = ProviderConfig::from_api_key(Some("sk-ant-test"))
            .unwrap()
            .with_max_output_tokens(256);
        AnthropicClient::new(config).unwrap()
    }

    fn sse_body(events: &[&str]) -> BoxStream<'static, reqwest::Result<Bytes>> {
        let chunks: Vec<reqwest::Result<Bytes>> = events
            .iter()
            .map(|e| Ok(Bytes::from(format!("data: {e}\n\n"))))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[test]
    fn prompt_body_shape() {
        let client = client();
        let req = GenerateRequest::prompt("Count from 1 to 3").with_system(Some("terse".into()));
        let json = serde_json::to_value(client.build_body(&req, true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 256,
                "messages": [{"role": "user", "content": "Count from 1 to 3"}],
                "system": "terse",
                "temperature": 0.7f32,
                "stream": true
            })
        );
    }

    #[test]
    fn non_streaming_body_omits_stream_flag() {
        let client = client();
        let req = GenerateRequest::messages(vec![ModelMessage {
            role: Role::User,
            content: "hi".into(),
        }]);
        let json = serde_json::to_value(client.build_body(&req, false)).unwrap();
        assert!(json.get("stream").is_none());
        assert!(json.get("system").is_none());
    }

    #[tokio::test]
    async fn deltas_become_fragments() {
        let body = sse_body(&[
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"1"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":", 2"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
            r#"{"type":"message_stop"}"#,
        ]);

        let items: Vec<_> = text_deltas(body).collect().await;
        let texts: Vec<_> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["1", ", 2"]);
    }

    #[tokio::test]
    async fn error_event_ends_stream_with_err() {
        let body = sse_body(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"par"}}"#,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"never"}}"#,
        ]);

        let items: Vec<_> = text_deltas(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "par");
        assert!(matches!(&items[1], Err(LlmError::Stream(m)) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let body = sse_body(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"cut"}}"#,
        ]);
        let items: Vec<_> = text_deltas(body).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
