//! Middleware pipeline: composable before/after logic around the router.
//!
//! Each middleware wraps the next layer, so it can inspect the request,
//! short-circuit with its own response, or decorate the downstream response.
//! The last layer of every pipeline built by [`crate::App`] is the router.
//!
//! - [`Middleware`] is the trait implemented by all middleware.
//! - [`Next`] is a cursor into the remaining chain; [`Next::run`] advances it.
//! - [`MiddlewareHandler`] is the type-erased, cheaply cloneable form.
//! - [`LoggerMiddleware`] logs one line per request.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, StatusCode, context::Context};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once.
///
/// # Examples
///
/// ```rust
/// use std::pin::Pin;
/// use ai_relay::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a `Next` positioned at the start of `middlewares`.
    ///
    /// The stack is shared, not copied, so building one per request is cheap.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without any layer producing a response, a
    /// `500 Internal Server Error` is returned.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::error(
                StatusCode::InternalServerError,
                "no response generated by middleware pipeline",
            ),
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] without calling `next`, or decorate the response
/// returned by `next`.
///
/// Middleware is shared across connection tasks, hence `Send + Sync`, and
/// `handle` returns a pinned `Send` future.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs each request's method, path, status, and time to response head.
///
/// For streamed responses the duration covers the handler only; the body
/// keeps flowing after this line is written.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_owned();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                streaming = response.is_streaming(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request handled"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Request;

    fn ctx() -> Context {
        let (req, _) = Request::parse(b"GET /api/ai-sdk/health HTTP/1.1\r\n\r\n").unwrap();
        Context::new(req)
    }

    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Tag {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let name = self.0;
            let log = self.1.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                let mut response = next.run(ctx).await;
                response.add_header("X-Seen-By", name);
                response
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn handle(&self, _ctx: Context, _next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::ServiceUnavailable) })
        }
    }

    fn terminal() -> MiddlewareHandler {
        Arc::new(|_ctx: Context, _next: Next| {
            Box::pin(async { Response::new(StatusCode::Ok).body("done") })
        })
    }

    #[tokio::test]
    async fn empty_chain_is_500() {
        let response = Next::new(Arc::from(Vec::new())).run(ctx()).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn layers_run_in_order_and_decorate_outward() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack: Arc<[MiddlewareHandler]> = Arc::from(vec![
            from_middleware(Arc::new(Tag("outer", log.clone()))),
            from_middleware(Arc::new(Tag("inner", log.clone()))),
            terminal(),
        ]);

        let response = Next::new(stack).run(ctx()).await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(*log.lock().unwrap(), ["outer", "inner"]);
        let seen: Vec<_> = response.headers().get_all("x-seen-by").collect();
        assert_eq!(seen, ["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack: Arc<[MiddlewareHandler]> = Arc::from(vec![
            from_middleware(Arc::new(Reject)),
            from_middleware(Arc::new(Tag("never", log.clone()))),
            terminal(),
        ]);

        let response = Next::new(stack).run(ctx()).await;

        assert_eq!(response.status(), StatusCode::ServiceUnavailable);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let stack: Arc<[MiddlewareHandler]> =
            Arc::from(vec![from_middleware(Arc::new(LoggerMiddleware)), terminal()]);
        let response = Next::new(stack).run(ctx()).await;
        assert_eq!(response.body_ref(), Some(&b"done"[..]));
    }
}
