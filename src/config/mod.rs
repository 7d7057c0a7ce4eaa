//! Server-side settings, resolved once at startup.

use std::time::Duration;

/// Default listen address. Port 1337 matches the CMS the endpoints were first
/// mounted in, so existing front ends keep working unchanged.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:1337";

/// Default mount point of the AI endpoints.
pub const DEFAULT_ROUTE_PREFIX: &str = "/api/ai-sdk";

/// Frames buffered between a relay and its connection before the relay waits.
pub const DEFAULT_STREAM_BUFFER: usize = 32;

/// Everything the HTTP side needs that is not a provider credential.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub route_prefix: String,
    /// Allowed browser origins; empty admits every origin.
    pub cors_origins: Vec<String>,
    /// Ends a stream on the error path when upstream stays silent this long.
    pub stream_idle_timeout: Option<Duration>,
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_owned(),
            cors_origins: Vec::new(),
            stream_idle_timeout: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Sets the origin allow-list from a comma-separated value such as
    /// `"http://localhost:3000, https://app.example.com"`.
    #[must_use]
    pub fn with_cors_origins(mut self, origins: &str) -> Self {
        self.cors_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned)
            .collect();
        self
    }

    /// A zero timeout disables it.
    #[must_use]
    pub fn with_stream_idle_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.stream_idle_timeout = secs.filter(|&s| s > 0).map(Duration::from_secs);
        self
    }

    /// Clamped to at least one frame.
    #[must_use]
    pub fn with_stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }
}
