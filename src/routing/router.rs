//! Route table and request dispatch.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Run the optional pre-hook, then the first route whose predicate accepts
//! - Funnel every failure to a single error callback
//! - Always leave the response closed
//!
//! # Design Decisions
//! - Registration order is absolute priority; there is no specificity ranking
//! - Registration needs `&mut Router`; serving shares `Arc<Router>`, so the
//!   table cannot change while requests are in flight
//! - A failing predicate clears the argument map before the next one runs
//! - A failing pre-hook is reported, then route selection still runs
//! - Errors raised by the error callback itself are logged and dropped

use std::future::Future;
use std::pin::Pin;

use axum::http::{Method, StatusCode};

use crate::http::error::{HttpError, HttpResult};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::observability::metrics;
use crate::routing::args::ArgMap;
use crate::routing::matcher::{MethodPattern, Pattern, RoutePredicate};

/// Boxed future returned by handlers and hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by a route handler.
pub type HandlerFuture<'a> = BoxFuture<'a, HttpResult<()>>;

/// What the pre-hook decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreHookOutcome {
    /// The hook produced the response; no route runs.
    Handled,
    /// Carry on with route matching.
    Continue,
}

/// Produces the response for a matched route.
pub trait Handler: Send + Sync {
    fn call<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        response: &'a mut HttpResponse,
        args: &'a mut ArgMap,
    ) -> HandlerFuture<'a>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        response: &'a mut HttpResponse,
        args: &'a mut ArgMap,
    ) -> HandlerFuture<'a> {
        self(request, response, args)
    }
}

/// Runs before route matching.
pub trait PreHook: Send + Sync {
    fn call<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        response: &'a mut HttpResponse,
        args: &'a mut ArgMap,
    ) -> BoxFuture<'a, HttpResult<PreHookOutcome>>;
}

impl<F> PreHook for F
where
    F: for<'a> Fn(
            &'a mut HttpRequest,
            &'a mut HttpResponse,
            &'a mut ArgMap,
        ) -> BoxFuture<'a, HttpResult<PreHookOutcome>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        response: &'a mut HttpResponse,
        args: &'a mut ArgMap,
    ) -> BoxFuture<'a, HttpResult<PreHookOutcome>> {
        self(request, response, args)
    }
}

/// Receives every dispatch failure.
pub trait ErrorHandler: Send + Sync {
    fn call<'a>(
        &'a self,
        request: &'a HttpRequest,
        response: &'a mut HttpResponse,
        error: &'a HttpError,
    ) -> BoxFuture<'a, HttpResult<()>>;
}

impl<F> ErrorHandler for F
where
    F: for<'a> Fn(&'a HttpRequest, &'a mut HttpResponse, &'a HttpError) -> BoxFuture<'a, HttpResult<()>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a HttpRequest,
        response: &'a mut HttpResponse,
        error: &'a HttpError,
    ) -> BoxFuture<'a, HttpResult<()>> {
        self(request, response, error)
    }
}

/// Writes the error message as a plain-text body.
///
/// Success statuses become `400 Bad Request`; anything already set (such as
/// the `404` of a route miss) is kept. Nothing is written once the head has
/// gone out.
pub fn default_error_handler<'a>(
    _request: &'a HttpRequest,
    response: &'a mut HttpResponse,
    error: &'a HttpError,
) -> BoxFuture<'a, HttpResult<()>> {
    Box::pin(async move {
        if response.headers_sent() {
            return Ok(());
        }
        if response.status().is_success() {
            response.set_status(StatusCode::BAD_REQUEST);
        }
        response.send_text(&error.to_string(), "text/plain").await
    })
}

struct RouteEntry {
    label: String,
    predicate: Box<dyn RoutePredicate>,
    handler: Box<dyn Handler>,
}

/// Ordered route table with its hooks.
pub struct Router {
    routes: Vec<RouteEntry>,
    before: Option<Box<dyn PreHook>>,
    on_error: Box<dyn ErrorHandler>,
}

impl Router {
    /// Empty table with the default error handler and no pre-hook.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            before: None,
            on_error: Box::new(default_error_handler),
        }
    }

    /// Register a handler for `method` requests whose path+query matches `pattern`.
    pub fn add<F>(&mut self, pattern: &str, method: Method, handler: F) -> HttpResult<&mut Self>
    where
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        let compiled = Pattern::new(pattern)?;
        let label = format!("{} {}", method, pattern);
        tracing::debug!(route = %label, placeholders = compiled.names().len(), "Route registered");
        self.routes.push(RouteEntry {
            label,
            predicate: Box::new(MethodPattern::new(method, compiled)),
            handler: Box::new(handler),
        });
        Ok(self)
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> HttpResult<&mut Self>
    where
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.add(pattern, Method::GET, handler)
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> HttpResult<&mut Self>
    where
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.add(pattern, Method::POST, handler)
    }

    pub fn put<F>(&mut self, pattern: &str, handler: F) -> HttpResult<&mut Self>
    where
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.add(pattern, Method::PUT, handler)
    }

    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> HttpResult<&mut Self>
    where
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.add(pattern, Method::DELETE, handler)
    }

    /// Register a handler guarded by an arbitrary predicate.
    pub fn add_predicate<P, F>(&mut self, predicate: P, handler: F) -> &mut Self
    where
        P: Fn(&HttpRequest, &mut ArgMap) -> HttpResult<bool> + Send + Sync + 'static,
        F: for<'a> Fn(&'a mut HttpRequest, &'a mut HttpResponse, &'a mut ArgMap) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        let label = format!("predicate #{}", self.routes.len());
        tracing::debug!(route = %label, "Route registered");
        self.routes.push(RouteEntry {
            label,
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        self
    }

    /// Install the pre-hook, replacing any previous one.
    pub fn before<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a mut HttpRequest,
                &'a mut HttpResponse,
                &'a mut ArgMap,
            ) -> BoxFuture<'a, HttpResult<PreHookOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Replace the error callback.
    pub fn on_error<F>(&mut self, callback: F) -> &mut Self
    where
        F: for<'a> Fn(&'a HttpRequest, &'a mut HttpResponse, &'a HttpError) -> BoxFuture<'a, HttpResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.on_error = Box::new(callback);
        self
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch one request. Never fails; the response is closed on return.
    pub async fn dispatch(&self, request: &mut HttpRequest, response: &mut HttpResponse) {
        let mut args = ArgMap::new();

        if let Some(hook) = &self.before {
            match hook.call(request, response, &mut args).await {
                Ok(PreHookOutcome::Handled) => {
                    tracing::debug!("Request handled by pre-hook");
                    response.close();
                    return;
                }
                Ok(PreHookOutcome::Continue) => {}
                Err(error) => {
                    tracing::error!(error = %error, "Pre-hook failed");
                    self.report(request, response, error).await;
                }
            }
        }

        for route in &self.routes {
            match route.predicate.evaluate(request, &mut args) {
                Ok(false) => {
                    args.clear();
                }
                Ok(true) => {
                    tracing::debug!(route = %route.label, "Route selected");
                    if let Err(error) = route.handler.call(request, response, &mut args).await {
                        tracing::error!(route = %route.label, error = %error, "Handler failed");
                        self.report(request, response, error).await;
                    }
                    response.close();
                    return;
                }
                Err(error) => {
                    tracing::error!(route = %route.label, error = %error, "Route predicate failed");
                    self.report(request, response, error).await;
                    response.close();
                    return;
                }
            }
        }

        let target = request.path_and_query().to_string();
        tracing::warn!(path = %target, "No route matched");
        metrics::record_route_miss();
        response.set_status(StatusCode::NOT_FOUND);
        self.report(request, response, HttpError::RouteNotFound(target)).await;
        response.close();
    }

    async fn report(&self, request: &HttpRequest, response: &mut HttpResponse, error: HttpError) {
        if let Err(callback_error) = self.on_error.call(request, response, &error).await {
            tracing::debug!(
                error = %error,
                callback_error = %callback_error,
                "Error callback failed"
            );
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn request(method: Method, uri: &str) -> HttpRequest {
        HttpRequest::from(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
    }

    fn reply<'a>(response: &'a mut HttpResponse, text: &'static str) -> HandlerFuture<'a> {
        Box::pin(async move { response.send_text(text, "text/plain").await })
    }

    async fn run(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let mut req = request(method, uri);
        let (mut resp, receiver) = HttpResponse::channel();
        router.dispatch(&mut req, &mut resp).await;
        let (head, body) = receiver.collect().await.unwrap();
        (head.status, String::from_utf8(body).unwrap())
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let mut router = Router::new();
        router.get("/items/{id}", |_, rp, _| reply(rp, "generic")).unwrap();
        router.get("/items/special", |_, rp, _| reply(rp, "special")).unwrap();

        let (status, body) = run(&router, Method::GET, "/items/special").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "generic");
    }

    #[tokio::test]
    async fn test_bindings_reach_handler() {
        let mut router = Router::new();
        router
            .get("/{action}/{paramA}-{paramB}", |_, rp, args| {
                Box::pin(async move {
                    let text = format!(
                        "{}:{}:{}",
                        args.get("action").unwrap_or_default(),
                        args.get("paramA").unwrap_or_default(),
                        args.get("paramB").unwrap_or_default()
                    );
                    rp.send_text(&text, "text/plain").await
                })
            })
            .unwrap();

        let (_, body) = run(&router, Method::GET, "/show/1-2").await;
        assert_eq!(body, "show:1:2");
    }

    #[tokio::test]
    async fn test_no_match_is_404_with_message() {
        let router = Router::new();
        let (status, body) = run(&router, Method::GET, "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Route /nowhere not found.");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_400() {
        let mut router = Router::new();
        router
            .get("/fail", |_, _, _| Box::pin(async { Err::<(), _>(HttpError::handler("boom")) }))
            .unwrap();

        let (status, body) = run(&router, Method::GET, "/fail").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "boom");
    }

    #[tokio::test]
    async fn test_failed_predicate_clears_partial_bindings() {
        let mut router = Router::new();
        router.add_predicate(
            |_, args| {
                args.insert("leak", "yes")?;
                Ok(false)
            },
            |_, rp, _| reply(rp, "never"),
        );
        router.add_predicate(
            |_, args| Ok(args.is_empty()),
            |_, rp, _| reply(rp, "clean"),
        );

        let (_, body) = run(&router, Method::GET, "/anything").await;
        assert_eq!(body, "clean");
    }

    #[tokio::test]
    async fn test_pre_hook_can_short_circuit() {
        let mut router = Router::new();
        router.before(|_, rp, _| {
            Box::pin(async move {
                rp.send_text("hooked", "text/plain").await?;
                Ok::<_, HttpError>(PreHookOutcome::Handled)
            })
        });
        router.get("/", |_, rp, _| reply(rp, "route")).unwrap();

        let (_, body) = run(&router, Method::GET, "/").await;
        assert_eq!(body, "hooked");
    }

    #[tokio::test]
    async fn test_failed_pre_hook_still_selects_route() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut router = Router::new();
        router.before(|_, _, args| {
            Box::pin(async move {
                args.insert("seen", "hook")?;
                Err::<PreHookOutcome, _>(HttpError::handler("hook broke"))
            })
        });
        let counter = std::sync::Arc::clone(&calls);
        router
            .get("/x", move |_, _, args| {
                assert_eq!(args.get("seen"), Some("hook"));
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Box::pin(async { Ok::<(), HttpError>(()) })
            })
            .unwrap();

        let (status, body) = run(&router, Method::GET, "/x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "hook broke");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_put_and_delete_shorthands() {
        let mut router = Router::new();
        router.put("/items/{id}", |_, rp, _| reply(rp, "put")).unwrap();
        router.delete("/items/{id}", |_, rp, _| reply(rp, "delete")).unwrap();

        assert_eq!(run(&router, Method::PUT, "/items/1").await.1, "put");
        assert_eq!(run(&router, Method::DELETE, "/items/1").await.1, "delete");
        assert_eq!(run(&router, Method::GET, "/items/1").await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_dispatch_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let router = Router::new();
        let mut req = request(Method::GET, "/");
        let (mut resp, _receiver) = HttpResponse::channel();
        assert_send(&router.dispatch(&mut req, &mut resp));
    }

    #[tokio::test]
    async fn test_error_callback_failure_is_swallowed() {
        let mut router = Router::new();
        router.on_error(|_, _, _| Box::pin(async { Err::<(), _>(HttpError::handler("callback broke")) }));

        let (status, body) = run(&router, Method::GET, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }
}
