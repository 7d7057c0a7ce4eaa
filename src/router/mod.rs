//! Request routing: map a method and an exact path to an async handler.
//!
//! A [`Router`] may be mounted under a prefix (`/api/ai-sdk`), in which case
//! every registered path is relative to it. Trailing slashes are normalized on
//! both registered and incoming paths, so `/ask/` and `/ask` are equivalent.
//!
//! An unknown path yields `404 Not Found`. A known path requested with a
//! method it was not registered for yields `405 Method Not Allowed` with an
//! `Allow` header listing the registered methods.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::{Method, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
///
/// Stored behind `Arc<dyn Fn(…)>` so routes can be shared across connection
/// tasks. Use [`Router::get`] and [`Router::post`] rather than building one by hand.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// Strips a trailing slash, except on the root path.
fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

// Joins a mount prefix and a route path into one normalized absolute path.
fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = normalize(path);
    match (prefix.is_empty(), path) {
        (true, "") => "/".to_owned(),
        (true, p) if p.starts_with('/') => p.to_owned(),
        (true, p) => format!("/{p}"),
        (false, "" | "/") => prefix.to_owned(),
        (false, p) if p.starts_with('/') => format!("{prefix}{p}"),
        (false, p) => format!("{prefix}/{p}"),
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust
/// use ai_relay::{Response, Router, StatusCode};
///
/// let mut router = Router::with_prefix("/api/ai-sdk");
/// router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });
/// assert_eq!(router.paths().collect::<Vec<_>>(), ["/api/ai-sdk/health"]);
/// ```
pub struct Router {
    prefix: String,
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create an empty router mounted at the root.
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Create an empty router whose routes all live under `prefix`.
    ///
    /// A missing leading slash is added and a trailing one dropped, so
    /// `"api/ai-sdk/"` and `"/api/ai-sdk"` mount at the same place.
    pub fn with_prefix(prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self {
            prefix,
            routes: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a handler for `GET` requests on `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests on `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: join(&self.prefix, path),
            handler,
        });
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Full paths of the registered routes, in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.path.as_str())
    }

    /// Dispatch the request held by `ctx` to the matching route.
    ///
    /// Routes are tested in registration order; the first whose method and
    /// path both match wins.
    pub async fn route(&self, ctx: Context) -> Response {
        let path = normalize(ctx.request().path());
        let method = ctx.request().method();

        let mut allowed: Vec<&str> = Vec::new();
        for route in self.routes.iter().filter(|route| route.path == path) {
            if &route.method == method {
                return (route.handler)(ctx).await;
            }
            allowed.push(route.method.as_str());
        }

        if allowed.is_empty() {
            return Response::error(StatusCode::NotFound, format!("no route for {path}"));
        }

        Response::error(
            StatusCode::MethodNotAllowed,
            format!("{method} is not allowed on {path}"),
        )
        .header("Allow", allowed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;

    fn make_ctx(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    fn body_text(response: &Response) -> String {
        String::from_utf8(response.body_ref().unwrap().to_vec()).unwrap()
    }

    // ── path joining ──────────────────────────────────────────────────────────

    #[test]
    fn join_without_prefix() {
        assert_eq!(join("", "/ask"), "/ask");
        assert_eq!(join("", "ask/"), "/ask");
        assert_eq!(join("", "/"), "/");
    }

    #[test]
    fn join_with_prefix() {
        assert_eq!(join("/api/ai-sdk", "/ask"), "/api/ai-sdk/ask");
        assert_eq!(join("/api/ai-sdk", "ask-stream"), "/api/ai-sdk/ask-stream");
        assert_eq!(join("/api/ai-sdk", "/"), "/api/ai-sdk");
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(Router::with_prefix("api/ai-sdk/").prefix(), "/api/ai-sdk");
        assert_eq!(Router::with_prefix("/").prefix(), "");
    }

    // ── Router registration ───────────────────────────────────────────────────

    #[test]
    fn router_new_is_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
    }

    #[test]
    fn router_len_increments() {
        let mut router = Router::new();
        router.get("/a", |_ctx| async { Response::new(StatusCode::Ok) });
        router.post("/b", |_ctx| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 2);
        assert!(!router.is_empty());
    }

    // ── Router::route ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn route_hits_prefixed_path() {
        let mut router = Router::with_prefix("/api/ai-sdk");
        router.post("/ask", |_ctx| async {
            Response::new(StatusCode::Ok).body("asked")
        });

        let resp = router.route(make_ctx("POST", "/api/ai-sdk/ask")).await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(body_text(&resp), "asked");
    }

    #[tokio::test]
    async fn route_trailing_slash_normalized() {
        let mut router = Router::with_prefix("/api/ai-sdk");
        router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });

        let resp = router.route(make_ctx("GET", "/api/ai-sdk/health/")).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn route_unprefixed_path_is_not_found() {
        let mut router = Router::with_prefix("/api/ai-sdk");
        router.post("/ask", |_ctx| async { Response::new(StatusCode::Ok) });

        let resp = router.route(make_ctx("POST", "/ask")).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
        assert!(body_text(&resp).contains("NotFoundError"));
    }

    #[tokio::test]
    async fn route_wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.post("/chat", |_ctx| async { Response::new(StatusCode::Ok) });

        let resp = router.route(make_ctx("GET", "/chat")).await;
        assert_eq!(resp.status(), StatusCode::MethodNotAllowed);
        assert_eq!(resp.headers().get("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn route_first_registration_wins() {
        let mut router = Router::new();
        router.get("/dup", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/dup", |_ctx| async {
            Response::new(StatusCode::InternalServerError)
        });

        let resp = router.route(make_ctx("GET", "/dup")).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn handler_sees_request_body() {
        let mut router = Router::new();
        router.post("/echo", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body_bytes(ctx.request().body().to_vec())
        });

        let raw = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, offset) = Request::parse(raw).unwrap();
        let resp = router
            .route(Context::new(req.with_body(&raw[offset..])))
            .await;
        assert_eq!(body_text(&resp), "hello");
    }
}
