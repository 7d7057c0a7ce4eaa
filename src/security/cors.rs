use std::pin::Pin;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// CORS middleware: validates the `Origin` header, answers preflight requests,
/// and adds `Access-Control-*` headers to actual responses.
///
/// # Behavior
///
/// - Without an `Origin` header, or with an origin not on the allow-list, the
///   request passes through unmodified.
/// - `OPTIONS` preflight requests are answered with `204 No Content`; the
///   downstream handler is not called.
/// - Other requests run normally and get the CORS headers appended.
/// - `Vary: Origin` is added whenever a specific origin is echoed back.
///
/// # Examples
///
/// ```rust
/// use ai_relay::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::with_origins(["http://localhost:3000"])
///     .allow_header("X-Request-ID")
///     .expose_header("x-vercel-ai-ui-message-stream");
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a permissive policy.
    ///
    /// | Setting          | Default value                     |
    /// |------------------|-----------------------------------|
    /// | Allowed origins  | `*` (all origins)                 |
    /// | Allowed methods  | `GET`, `POST`, `OPTIONS`          |
    /// | Allowed headers  | `Content-Type`, `Authorization`   |
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_owned()],
            allowed_methods: vec!["GET".to_owned(), "POST".to_owned(), "OPTIONS".to_owned()],
            allowed_headers: vec!["Content-Type".to_owned(), "Authorization".to_owned()],
            exposed_headers: Vec::new(),
        }
    }

    /// Creates a policy that only admits the listed origins.
    ///
    /// An empty list, or one containing `"*"`, is the same as [`new`](Self::new).
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: Vec<String> = origins
            .into_iter()
            .map(Into::into)
            .map(|o| o.trim().trim_end_matches('/').to_owned())
            .filter(|o| !o.is_empty())
            .collect();
        let mut cors = Self::new();
        if !origins.is_empty() && !origins.iter().any(|o| o == "*") {
            cors.allowed_origins = origins;
        }
        cors
    }

    /// Adds an allowed origin. Adding `"*"` admits every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        if origin == "*" {
            self.allowed_origins = vec![origin];
        } else if !self.is_wildcard() {
            self.allowed_origins.push(origin);
        }
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    /// Adds a response header the browser may read, sent in `Access-Control-Expose-Headers`.
    #[must_use]
    pub fn expose_header(mut self, header: impl Into<String>) -> Self {
        self.exposed_headers.push(header.into());
        self
    }

    fn is_wildcard(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    // Value for `Access-Control-Allow-Origin`, or `None` if the origin is rejected.
    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.is_wildcard() {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let policy = self.clone();

        Box::pin(async move {
            let request_origin = ctx.request().headers().get("origin").map(str::to_owned);
            let is_preflight = ctx.request().method() == &Method::Options;
            let Some(origin) = request_origin else {
                return next.run(ctx).await;
            };
            let Some(allow_origin) = policy.resolve_origin(&origin) else {
                tracing::debug!(%origin, "origin not allowed, skipping CORS headers");
                return next.run(ctx).await;
            };

            let methods = policy.allowed_methods.join(", ");
            let headers = policy.allowed_headers.join(", ");
            let is_wildcard = allow_origin == "*";

            if is_preflight {
                let mut resp = Response::new(StatusCode::NoContent)
                    .header("Access-Control-Allow-Origin", &allow_origin)
                    .header("Access-Control-Allow-Methods", &methods)
                    .header("Access-Control-Allow-Headers", &headers)
                    .header("Access-Control-Max-Age", "3600");
                if !is_wildcard {
                    resp.add_header("Vary", "Origin");
                }
                return resp;
            }

            let mut resp = next.run(ctx).await;
            resp.add_header("Access-Control-Allow-Origin", &allow_origin);
            resp.add_header("Access-Control-Allow-Methods", &methods);
            resp.add_header("Access-Control-Allow-Headers", &headers);
            if !policy.exposed_headers.is_empty() {
                resp.add_header(
                    "Access-Control-Expose-Headers",
                    policy.exposed_headers.join(", "),
                );
            }
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}
