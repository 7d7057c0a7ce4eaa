//! Endpoint handlers.
//!
//! Every handler validates its body before touching the provider, so a
//! malformed request never costs an upstream call.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{ApiError, AppState, UI_MESSAGE_STREAM_HEADER};
use crate::context::Context;
use crate::llm::{TextStream, UiMessage};
use crate::realtime::{ChannelSink, RelayProtocol};
use crate::{Response, StatusCode};

#[derive(Debug, Deserialize)]
struct AskBody {
    #[serde(default)]
    prompt: Option<Value>,
    #[serde(default)]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    messages: Option<Value>,
    #[serde(default)]
    system: Option<String>,
}

fn parse_body<T: DeserializeOwned>(ctx: &Context) -> Result<T, ApiError> {
    ctx.json()
        .map_err(|e| ApiError::Validation(format!("request body must be a JSON object: {e}")))
}

const ASK_PROMPT_REQUIRED: &str = "prompt is required and must be a string";
const ASK_STREAM_PROMPT_REQUIRED: &str = "prompt is required";

/// Accepts any non-empty string; whitespace is forwarded as-is.
fn require_prompt(prompt: Option<Value>, message: &'static str) -> Result<String, ApiError> {
    match prompt {
        Some(Value::String(prompt)) if !prompt.is_empty() => Ok(prompt),
        _ => Err(ApiError::validation(message)),
    }
}

fn require_messages(messages: Option<Value>) -> Result<Vec<UiMessage>, ApiError> {
    match messages {
        Some(Value::Array(items)) if !items.is_empty() => {
            serde_json::from_value(Value::Array(items))
                .map_err(|e| ApiError::Validation(format!("messages are malformed: {e}")))
        }
        _ => Err(ApiError::validation(
            "messages is required and must be a non-empty array",
        )),
    }
}

/// Spawns a relay feeding a fresh event-stream response.
fn relay_response(state: &AppState, protocol: RelayProtocol, upstream: TextStream) -> Response {
    let (sink, rx) = ChannelSink::channel(state.stream_buffer());
    let relay = state.relay(protocol);
    tokio::spawn(async move {
        let outcome = relay.run(upstream, sink).await;
        debug!(
            terminal = ?outcome.terminal,
            fragments = outcome.fragments,
            frames = outcome.frames,
            "relay session ended"
        );
    });
    Response::event_stream(rx)
}

/// `POST /ask`: one prompt, one complete answer.
pub async fn ask(state: Arc<AppState>, ctx: Context) -> Response {
    async {
        let body: AskBody = parse_body(&ctx)?;
        let prompt = require_prompt(body.prompt, ASK_PROMPT_REQUIRED)?;
        let text = state.provider().ask(&prompt, body.system).await?;
        Ok::<_, ApiError>(Response::json(StatusCode::Ok, &json!({ "data": { "text": text } })))
    }
    .await
    .unwrap_or_else(ApiError::into_response)
}

/// `POST /ask-stream`: one prompt, answer streamed as text frames.
pub async fn ask_stream(state: Arc<AppState>, ctx: Context) -> Response {
    async {
        let body: AskBody = parse_body(&ctx)?;
        let prompt = require_prompt(body.prompt, ASK_STREAM_PROMPT_REQUIRED)?;
        let upstream = state.provider().ask_stream(&prompt, body.system).await?;
        Ok::<_, ApiError>(relay_response(&state, RelayProtocol::Text, upstream))
    }
    .await
    .unwrap_or_else(ApiError::into_response)
}

/// `POST /chat`: a conversation, answer streamed as UI message chunks.
pub async fn chat(state: Arc<AppState>, ctx: Context) -> Response {
    async {
        let body: ChatBody = parse_body(&ctx)?;
        let messages = require_messages(body.messages)?;
        let upstream = state.provider().chat(&messages, body.system).await?;
        Ok::<_, ApiError>(
            relay_response(&state, RelayProtocol::UiMessage, upstream)
                .header(UI_MESSAGE_STREAM_HEADER, "v1"),
        )
    }
    .await
    .unwrap_or_else(ApiError::into_response)
}

/// `GET /health`
pub async fn health(state: Arc<AppState>, _ctx: Context) -> Response {
    let provider = state.provider();
    Response::json(
        StatusCode::Ok,
        &json!({
            "status": "ok",
            "initialized": provider.is_initialized(),
            "model": provider.model(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_must_be_a_non_empty_string() {
        assert_eq!(require_prompt(Some(json!("hi")), ASK_PROMPT_REQUIRED).unwrap(), "hi");
        assert_eq!(require_prompt(Some(json!("  ")), ASK_PROMPT_REQUIRED).unwrap(), "  ");
        for bad in [None, Some(json!(42)), Some(json!(null)), Some(json!(""))] {
            assert!(matches!(
                require_prompt(bad, ASK_PROMPT_REQUIRED),
                Err(ApiError::Validation(m)) if m == ASK_PROMPT_REQUIRED
            ));
        }
    }

    #[test]
    fn prompt_error_wording_comes_from_the_endpoint() {
        let err = require_prompt(Some(json!("")), ASK_STREAM_PROMPT_REQUIRED).unwrap_err();
        assert!(matches!(err, ApiError::Validation(m) if m == "prompt is required"));
        let err = require_prompt(Some(json!(7)), ASK_PROMPT_REQUIRED).unwrap_err();
        assert!(
            matches!(err, ApiError::Validation(m) if m == "prompt is required and must be a string")
        );
    }

    #[test]
    fn messages_must_be_a_non_empty_array() {
        for bad in [None, Some(json!([])), Some(json!("hi")), Some(json!({}))] {
            let err = require_messages(bad).unwrap_err();
            assert_eq!(
                err.to_string(),
                "messages is required and must be a non-empty array"
            );
        }
    }

    #[test]
    fn malformed_messages_are_rejected() {
        let err = require_messages(Some(json!([{"role": "robot"}]))).unwrap_err();
        assert!(err.to_string().starts_with("messages are malformed"));
    }

    #[test]
    fn well_formed_messages_parse() {
        let messages = require_messages(Some(json!([
            {"id": "1", "role": "user", "parts": [{"type": "text", "text": "Hello"}]}
        ])))
        .unwrap();
        assert_eq!(messages[0].text(), "Hello");
    }
}
