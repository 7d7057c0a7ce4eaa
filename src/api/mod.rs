//! The AI endpoints and the application assembled around them.
//!
//! | Method | Path          | Answer |
//! |--------|---------------|--------|
//! | POST   | `/ask`        | `{"data":{"text": ...}}` |
//! | POST   | `/ask-stream` | event stream of `{"text"}` frames, then `[DONE]` |
//! | POST   | `/chat`       | UI message stream (v1), then `[DONE]` |
//! | GET    | `/health`     | `{"status":"ok","initialized":bool,"model":...}` |
//!
//! All paths are relative to the configured route prefix.

mod app;
mod error;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

pub use app::App;
pub use error::ApiError;

use crate::config::{DEFAULT_STREAM_BUFFER, ServerConfig};
use crate::context::Context;
use crate::llm::Provider;
use crate::middleware::LoggerMiddleware;
use crate::realtime::{RelayProtocol, StreamRelay};
use crate::router::Router;
use crate::security::CorsMiddleware;

/// Response header announcing the UI message stream protocol to the browser SDK.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    provider: Provider,
    stream_idle_timeout: Option<Duration>,
    stream_buffer: usize,
}

impl AppState {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            stream_idle_timeout: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Takes the stream settings from `config`.
    pub fn from_config(provider: Provider, config: &ServerConfig) -> Self {
        Self {
            provider,
            stream_idle_timeout: config.stream_idle_timeout,
            stream_buffer: config.stream_buffer.max(1),
        }
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }

    /// A relay configured for this server.
    pub fn relay(&self, protocol: RelayProtocol) -> StreamRelay {
        let relay = StreamRelay::new(protocol);
        match self.stream_idle_timeout {
            Some(timeout) => relay.with_idle_timeout(timeout),
            None => relay,
        }
    }
}

/// Registers the endpoints under `prefix`.
pub fn routes(state: Arc<AppState>, prefix: &str) -> Router {
    let mut router = Router::with_prefix(prefix);

    let s = Arc::clone(&state);
    router.post("/ask", move |ctx: Context| handlers::ask(Arc::clone(&s), ctx));
    let s = Arc::clone(&state);
    router.post("/ask-stream", move |ctx: Context| handlers::ask_stream(Arc::clone(&s), ctx));
    let s = Arc::clone(&state);
    router.post("/chat", move |ctx: Context| handlers::chat(Arc::clone(&s), ctx));
    router.get("/health", move |ctx: Context| handlers::health(Arc::clone(&state), ctx));

    router
}

/// The full application: request logging, CORS, then the endpoints.
pub fn build_app(state: Arc<AppState>, config: &ServerConfig) -> App {
    let cors = CorsMiddleware::with_origins(config.cors_origins.iter().cloned())
        .expose_header(UI_MESSAGE_STREAM_HEADER);

    App::new(routes(state, &config.route_prefix))
        .with(LoggerMiddleware)
        .with(cors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_are_mounted_under_prefix() {
        let router = routes(Arc::new(AppState::new(Provider::uninitialized())), "/api/ai-sdk");
        let paths: Vec<_> = router.paths().collect();
        assert_eq!(
            paths,
            [
                "/api/ai-sdk/ask",
                "/api/ai-sdk/ask-stream",
                "/api/ai-sdk/chat",
                "/api/ai-sdk/health"
            ]
        );
    }

    #[test]
    fn relay_picks_up_idle_timeout() {
        let config = ServerConfig::default().with_stream_idle_timeout_secs(Some(5));
        let state = AppState::from_config(Provider::uninitialized(), &config);
        let relay = state.relay(RelayProtocol::Text);
        assert_eq!(relay.protocol(), RelayProtocol::Text);
        assert_eq!(relay.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(state.stream_buffer(), config.stream_buffer);
    }
}
