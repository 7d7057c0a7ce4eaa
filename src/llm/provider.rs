//! The configured upstream, passed explicitly to request handlers.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::anthropic::AnthropicClient;
use super::config::ProviderConfig;
use super::messages::{UiMessage, to_model_messages};
use super::{GenerateRequest, LlmError, TextGenerator, TextStream};

/// Holds the generator, or nothing if credentials were never supplied.
///
/// Initialization happens once, when the value is built. Every operation on
/// an uninitialized provider fails fast with [`LlmError::NotInitialized`].
/// Cloning is cheap and shares the same generator.
#[derive(Clone, Default)]
pub struct Provider {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("initialized", &self.is_initialized())
            .field("model", &self.model())
            .finish()
    }
}

impl Provider {
    /// A provider with no generator.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// Builds the Anthropic-backed provider; `None` yields an uninitialized one.
    pub fn from_config(config: Option<ProviderConfig>) -> Result<Self, LlmError> {
        let Some(config) = config else {
            info!("no provider credentials configured, AI endpoints will report not initialized");
            return Ok(Self::uninitialized());
        };
        let client = AnthropicClient::new(config)?;
        info!(model = client.config().chat_model(), base_url = client.config().base_url(), "provider initialized");
        Ok(Self::with_generator(Arc::new(client)))
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.generator.is_some()
    }

    pub fn model(&self) -> Option<&str> {
        self.generator.as_deref().map(TextGenerator::model)
    }

    fn generator(&self) -> Result<&dyn TextGenerator, LlmError> {
        self.generator.as_deref().ok_or(LlmError::NotInitialized)
    }

    /// Single-prompt, complete answer.
    pub async fn ask(&self, prompt: &str, system: Option<String>) -> Result<String, LlmError> {
        let request = GenerateRequest::prompt(prompt).with_system(system);
        self.generator()?.generate(request).await
    }

    /// Single-prompt, streamed answer.
    pub async fn ask_stream(
        &self,
        prompt: &str,
        system: Option<String>,
    ) -> Result<TextStream, LlmError> {
        let request = GenerateRequest::prompt(prompt).with_system(system);
        self.generator()?.stream(request).await
    }

    /// Multi-turn chat, streamed.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidRequest`] if no user or assistant message carries text.
    pub async fn chat(
        &self,
        messages: &[UiMessage],
        system: Option<String>,
    ) -> Result<TextStream, LlmError> {
        let generator = self.generator()?;
        let chat = to_model_messages(messages, system);
        if chat.messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "messages must contain at least one user or assistant text part".into(),
            ));
        }
        let request = GenerateRequest::messages(chat.messages).with_system(chat.system);
        generator.stream(request).await
    }
}
