//! `ai-relay` server binary.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai_relay::api::{AppState, build_app};
use ai_relay::config::{DEFAULT_BIND_ADDR, DEFAULT_ROUTE_PREFIX, DEFAULT_STREAM_BUFFER, ServerConfig};
use ai_relay::llm::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, Provider, ProviderConfig};
use ai_relay::{Request, Server};

#[derive(Parser, Debug)]
#[command(name = "ai-relay")]
#[command(version, about = "LLM proxy with server-sent event streaming")]
struct Args {
    /// TCP bind address
    #[arg(long, default_value = DEFAULT_BIND_ADDR, env = "AI_RELAY_ADDR")]
    addr: String,

    /// Path the endpoints are mounted under
    #[arg(long, default_value = DEFAULT_ROUTE_PREFIX, env = "AI_RELAY_ROUTE_PREFIX")]
    route_prefix: String,

    /// Comma-separated browser origins allowed by CORS; all origins when unset
    #[arg(long, env = "AI_RELAY_CORS_ORIGINS")]
    cors_origins: Option<String>,

    /// Anthropic API key. Without it the server starts but every AI endpoint
    /// answers "AI SDK not initialized".
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    /// Anthropic API base URL
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    anthropic_base_url: Option<String>,

    /// Chat model; must be one of the supported models
    #[arg(long, env = "AI_RELAY_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Sampling temperature (0.0 to 1.0)
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE, env = "AI_RELAY_TEMPERATURE")]
    temperature: f32,

    /// Upper bound on generated tokens per request
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS, env = "AI_RELAY_MAX_OUTPUT_TOKENS")]
    max_output_tokens: u32,

    /// End a stream with an error frame after this many silent seconds (0 disables)
    #[arg(long, env = "AI_RELAY_STREAM_IDLE_TIMEOUT_SECS")]
    stream_idle_timeout_secs: Option<u64>,

    /// Frames buffered per stream before the relay waits on the client
    #[arg(long, default_value_t = DEFAULT_STREAM_BUFFER, env = "AI_RELAY_STREAM_BUFFER")]
    stream_buffer: usize,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "AI_RELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "AI_RELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let config = ServerConfig {
            bind_addr: self.addr.clone(),
            route_prefix: self.route_prefix.clone(),
            ..ServerConfig::default()
        };
        let config = match &self.cors_origins {
            Some(origins) => config.with_cors_origins(origins),
            None => config,
        };
        config
            .with_stream_idle_timeout_secs(self.stream_idle_timeout_secs)
            .with_stream_buffer(self.stream_buffer)
    }

    fn provider_config(&self) -> Option<ProviderConfig> {
        ProviderConfig::from_api_key(self.anthropic_api_key.clone()).map(|config| {
            config
                .with_base_url(self.anthropic_base_url.clone())
                .with_chat_model(self.chat_model.as_deref())
                .with_temperature(self.temperature)
                .with_max_output_tokens(self.max_output_tokens)
        })
    }
}

/// A provider that cannot be built is logged and left uninitialized, so the
/// server still starts and answers "AI SDK not initialized".
fn build_provider(config: Option<ProviderConfig>) -> Provider {
    Provider::from_config(config).unwrap_or_else(|e| {
        error!(error = %e, "failed to build the provider client, continuing uninitialized");
        Provider::uninitialized()
    })
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(log_level: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("ai_relay={log_level}")));
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    let config = args.server_config();
    let provider = build_provider(args.provider_config());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.bind_addr,
        route_prefix = %config.route_prefix,
        initialized = provider.is_initialized(),
        "starting ai-relay"
    );

    let state = Arc::new(AppState::from_config(provider, &config));
    let app = Arc::new(build_app(state, &config));

    let server = Server::bind(&config.bind_addr).await?;
    server
        .run_until(
            move |req: Request| {
                let app = Arc::clone(&app);
                async move { app.handle(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    info!("ai-relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["ai-relay", "--anthropic-api-key", "sk-ant-test"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_map_to_server_config() {
        let args = parse(&[
            "--addr",
            "0.0.0.0:8080",
            "--route-prefix",
            "/ai",
            "--cors-origins",
            "http://localhost:3000,https://app.example.com",
            "--stream-idle-timeout-secs",
            "30",
        ]);
        let config = args.server_config();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.route_prefix, "/ai");
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn flags_map_to_provider_config() {
        let args = parse(&[
            "--chat-model",
            "claude-haiku-4-5",
            "--temperature",
            "0.2",
            "--anthropic-base-url",
            "http://127.0.0.1:9999/",
        ]);
        let config = args.provider_config().unwrap();
        assert_eq!(config.chat_model(), "claude-haiku-4-5");
        assert!((config.temperature() - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn blank_api_key_means_uninitialized() {
        let args = Args::try_parse_from(["ai-relay", "--anthropic-api-key", " "]).unwrap();
        assert!(args.provider_config().is_none());
    }

    #[test]
    fn unusable_api_key_falls_back_to_uninitialized() {
        let args = Args::try_parse_from(["ai-relay", "--anthropic-api-key", "sk-ant\nbad"]).unwrap();
        assert!(args.provider_config().is_some());
        assert!(!build_provider(args.provider_config()).is_initialized());
    }

    #[test]
    fn valid_api_key_initializes_the_provider() {
        let args = parse(&[]);
        assert!(build_provider(args.provider_config()).is_initialized());
    }
}
