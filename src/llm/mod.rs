//! LLM integration: the upstream text generator behind every endpoint.
//!
//! The relay never talks to a provider directly. It consumes a
//! [`TextGenerator`], which yields either a complete string or a
//! [`TextStream`] of fragments. [`AnthropicClient`] is the production
//! implementation; tests plug in scripted generators.
//!
//! [`Provider`] holds the configured generator (or none) and is passed
//! explicitly to whoever needs it, so there is no process-wide singleton.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod anthropic;
pub mod config;
pub mod messages;
pub mod provider;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use config::{
    CHAT_MODELS, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, ProviderConfig,
};
pub use messages::{ModelMessage, Role, UiMessage, UiPart};
pub use provider::Provider;

/// An ordered stream of generated text fragments.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Errors raised by the provider integration.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("AI SDK not initialized")]
    NotInitialized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// What to generate from: a single prompt or a prior conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateInput {
    Prompt(String),
    Messages(Vec<ModelMessage>),
}

/// One generation call.
///
/// `temperature` and `max_output_tokens` fall back to the provider
/// configuration when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub input: GenerateInput,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::from_input(GenerateInput::Prompt(prompt.into()))
    }

    pub fn messages(messages: Vec<ModelMessage>) -> Self {
        Self::from_input(GenerateInput::Messages(messages))
    }

    fn from_input(input: GenerateInput) -> Self {
        Self {
            input,
            system: None,
            temperature: None,
            max_output_tokens: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.trim().is_empty());
        self
    }
}

/// The upstream generator seam.
///
/// Futures are boxed so the trait stays object-safe and the provider can be
/// held as `Arc<dyn TextGenerator>`.
pub trait TextGenerator: Send + Sync {
    /// Generates the full response text.
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String, LlmError>>;

    /// Starts a streamed generation.
    ///
    /// Errors returned here happen before the first fragment (bad
    /// credentials, rejected request); errors inside the stream happen after.
    fn stream(&self, request: GenerateRequest) -> BoxFuture<'_, Result<TextStream, LlmError>>;

    /// The model identifier requests are sent to.
    fn model(&self) -> &str;
}
