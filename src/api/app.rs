use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::router::Router;
use crate::{Request, Response};

/// A router with a middleware chain in front of it.
///
/// Middleware added first runs outermost. The router is always the last layer.
#[derive(Clone)]
pub struct App {
    middlewares: Vec<MiddlewareHandler>,
    router: Arc<Router>,
    stack: Arc<[MiddlewareHandler]>,
}

impl App {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        Self {
            stack: Self::assemble(&[], &router),
            middlewares: Vec::new(),
            router,
        }
    }

    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
        self.stack = Self::assemble(&self.middlewares, &self.router);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn assemble(middlewares: &[MiddlewareHandler], router: &Arc<Router>) -> Arc<[MiddlewareHandler]> {
        let router = Arc::clone(router);
        let terminal: MiddlewareHandler = Arc::new(move |ctx: Context, _next: Next| {
            let router = Arc::clone(&router);
            Box::pin(async move { router.route(ctx).await })
        });
        middlewares
            .iter()
            .cloned()
            .chain(std::iter::once(terminal))
            .collect()
    }

    /// Runs `request` through the middleware chain and the router.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.stack))
            .run(Context::new(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::LoggerMiddleware;
    use crate::security::CorsMiddleware;
    use crate::StatusCode;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn app() -> App {
        let mut router = Router::with_prefix("/api/ai-sdk");
        router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });
        App::new(router)
            .with(LoggerMiddleware)
            .with(CorsMiddleware::new())
    }

    #[tokio::test]
    async fn routes_through_the_chain() {
        let response = app()
            .handle(request("GET /api/ai-sdk/health HTTP/1.1\r\nOrigin: http://localhost:3000\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.headers().get("access-control-allow-origin"), Some("*"));
    }

    #[tokio::test]
    async fn preflight_never_reaches_the_router() {
        let response = app()
            .handle(request("OPTIONS /api/ai-sdk/chat HTTP/1.1\r\nOrigin: http://localhost:3000\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::NoContent);
    }

    #[tokio::test]
    async fn bare_app_is_just_the_router() {
        let response = App::new(Router::new())
            .handle(request("GET /missing HTTP/1.1\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }
}
