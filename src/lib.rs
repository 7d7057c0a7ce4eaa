//! # ai-relay
//!
//! A thin HTTP proxy in front of a hosted LLM. Prompts come in over HTTP/1.1;
//! answers go back either whole or as a server-sent event stream relayed
//! fragment by fragment from the provider.
//!
//! The crate is layered bottom-up:
//!
//! - [`http`], [`server`]: HTTP/1.1 primitives and the Tokio accept loop,
//!   including chunked streaming of response bodies.
//! - [`router`], [`context`], [`middleware`], [`security`]: dispatch,
//!   request logging and CORS.
//! - [`realtime`]: SSE frames and the [`StreamRelay`](realtime::StreamRelay).
//! - [`llm`]: the upstream generator seam and the Anthropic client.
//! - [`api`]: the endpoints, wired together by [`api::build_app`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ai_relay::api::{AppState, build_app};
//! use ai_relay::config::ServerConfig;
//! use ai_relay::llm::{Provider, ProviderConfig};
//! use ai_relay::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let provider = Provider::from_config(ProviderConfig::from_api_key(
//!         std::env::var("ANTHROPIC_API_KEY").ok(),
//!     ))?;
//!     let app = Arc::new(build_app(
//!         Arc::new(AppState::from_config(provider, &config)),
//!         &config,
//!     ));
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     server
//!         .run(move |req| {
//!             let app = Arc::clone(&app);
//!             async move { app.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod http;
pub mod llm;
pub mod middleware;
pub mod realtime;
pub mod router;
pub mod security;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use api::App;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
