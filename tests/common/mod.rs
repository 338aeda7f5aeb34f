//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use tokio::net::TcpListener;

use switchyard::config::ServerConfig;
use switchyard::http::ResponseHead;
use switchyard::net::Listener;
use switchyard::{HttpRequest, HttpResponse, HttpServer, Router, Shutdown};

/// Build an in-process request.
pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> HttpRequest {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    HttpRequest::from(builder.body(body.into()).unwrap())
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> HttpRequest {
    request("GET", uri, headers, Body::empty())
}

/// Dispatch through `router` and collect the whole response.
pub async fn dispatch(router: &Router, mut request: HttpRequest) -> (ResponseHead, Vec<u8>) {
    let (mut response, receiver) = HttpResponse::channel();
    let (_, collected) = tokio::join!(
        async {
            router.dispatch(&mut request, &mut response).await;
            drop(response);
        },
        receiver.collect()
    );
    collected.expect("dispatch left no response head")
}

pub fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Serve `router` on an ephemeral port. Trigger the returned `Shutdown` to stop.
pub async fn start_server(router: Router) -> (SocketAddr, Shutdown) {
    start_server_with(ServerConfig::default(), router).await
}

pub async fn start_server_with(config: ServerConfig, router: Router) -> (SocketAddr, Shutdown) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections).unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config, router);
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}
