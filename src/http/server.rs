//! HTTP server setup and the accept loop.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Serve HTTP/1.1 on each connection with hyper
//! - Wire up middleware (tracing, body limit)
//! - Hand each request to the `Router` on its own task
//! - Stop accepting on shutdown and let open connections drain
//!
//! # Design Decisions
//! - The axum service only bridges: it converts the request, spawns dispatch
//!   and streams whatever the handler writes
//! - The response head is awaited before hyper sees the response, so handlers
//!   can set status and headers up to their first body write

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, Response},
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::Service;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::observability::tracing::{request_id, request_span, REQUEST_ID_HEADER};
use crate::routing::Router;

/// How long open connections get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into the bridge handler.
#[derive(Clone)]
struct AppState {
    router: Arc<Router>,
}

/// HTTP server driving a `Router`.
pub struct HttpServer {
    app: axum::Router,
    config: ServerConfig,
    router: Arc<Router>,
    connections: ConnectionTracker,
}

impl HttpServer {
    pub fn new(config: ServerConfig, router: impl Into<Arc<Router>>) -> Self {
        let router = router.into();
        let app = Self::build_service(&config, Arc::clone(&router));
        Self {
            app,
            config,
            router,
            connections: ConnectionTracker::new(),
        }
    }

    /// Build the axum service with all middleware layers.
    fn build_service(config: &ServerConfig, router: Arc<Router>) -> axum::Router {
        axum::Router::new()
            .fallback(dispatch_handler)
            .with_state(AppState { router })
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TraceLayer::new_for_http())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Run the accept loop until `shutdown` fires, then wait for open
    /// connections to finish.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, routes = self.router.len(), "HTTP server starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit, shutdown.resubscribe()),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        let open = self.connections.active_count();
        if open > 0 {
            tracing::info!(open, "Draining connections");
            if !self.connections.drain(DRAIN_TIMEOUT).await {
                tracing::warn!(
                    open = self.connections.active_count(),
                    "Drain timed out, dropping remaining connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let app = self.app.clone();
        let guard = self.connections.track();

        tokio::spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();

            let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(peer));
                let mut app = app.clone();
                async move { app.call(request).await }
            });

            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);

            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = shutdown.recv() => {
                    connection.as_mut().graceful_shutdown();
                    connection.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(connection_id = %connection_id, peer_addr = %peer, error = %e, "Connection ended with error");
            }
            drop(guard);
        });
    }
}

/// Bridges one axum request into `Router::dispatch`.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let started = Instant::now();
    let method = request.method().to_string();
    let id = request_id(request.headers());
    let span = request_span(&id, &method, request.uri().path());

    let mut http_request = HttpRequest::from(request);
    let (mut http_response, receiver) = HttpResponse::channel();

    let router = state.router;
    tokio::spawn(
        async move {
            router.dispatch(&mut http_request, &mut http_response).await;
        }
        .instrument(span),
    );

    let mut response = receiver.into_response().await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    metrics::record_request(&method, response.status().as_u16(), started);
    response
}
