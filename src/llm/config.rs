//! Provider configuration.

use std::fmt;
use std::time::Duration;

use tracing::warn;

/// Models a client may select through configuration.
pub const CHAT_MODELS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-opus-4-1",
    "claude-haiku-4-5",
    "claude-3-7-sonnet-latest",
    "claude-3-5-haiku-latest",
];

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Anthropic requires an explicit output budget on every request.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials and generation defaults for the provider.
///
/// Construct with [`ProviderConfig::from_api_key`], which returns `None` when
/// no usable key is present. That `None` is how the server ends up running
/// uninitialized.
#[derive(Clone)]
pub struct ProviderConfig {
    api_key: String,
    base_url: String,
    chat_model: String,
    temperature: f32,
    max_output_tokens: u32,
    connect_timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl ProviderConfig {
    /// Returns `None` if the key is absent or blank.
    pub fn from_api_key(api_key: Option<impl Into<String>>) -> Option<Self> {
        let api_key = api_key.map(Into::into)?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            chat_model: DEFAULT_MODEL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Overrides the API base URL (for proxies and tests). A trailing slash is trimmed.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<impl Into<String>>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.into().trim_end_matches('/').to_owned();
        }
        self
    }

    /// Selects a chat model. Names outside [`CHAT_MODELS`] are ignored.
    #[must_use]
    pub fn with_chat_model(mut self, model: Option<&str>) -> Self {
        match model {
            Some(m) if CHAT_MODELS.contains(&m) => self.chat_model = m.to_owned(),
            Some(m) => warn!(model = m, default = %self.chat_model, "unknown chat model, keeping default"),
            None => {}
        }
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens.max(1);
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
