//! Security middleware.
//!
//! - [`CorsMiddleware`]: Cross-Origin Resource Sharing headers and preflight
//!   (`OPTIONS`) short-circuiting, so a browser front end on another origin
//!   can call the AI endpoints.

mod cors;

pub use cors::CorsMiddleware;
