//! switchyard demo server
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      SWITCHYARD                       │
//!     Client Request   │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!     ─────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │      │
//!                      │  │listener │    │ server  │    │   Router     │      │
//!                      │  └─────────┘    └─────────┘    └──────┬───────┘      │
//!                      │                                       │ handler      │
//!                      │                       ┌───────────────┼────────┐     │
//!                      │                       ▼               ▼        │     │
//!                      │                ┌────────────┐  ┌────────────┐  │     │
//!                      │                │    body    │  │ responder  │  │     │
//!                      │                │ multipart  │  │ range/304  │  │     │
//!                      │                └────────────┘  └─────┬──────┘  │     │
//!     Client Response  │                                      │         │     │
//!     ◀────────────────┼──────────── HttpResponse ◀───────────┘         │     │
//!                      │                                                │     │
//!                      │  config · observability · lifecycle ◀──────────┘     │
//!                      └──────────────────────────────────────────────────────┘
//! ```
//!
//! Demo routes:
//! - `/` serves the index page of the static root
//! - a GET for a file that exists under the static root is served with
//!   range and conditional GET support
//! - `POST /upload/` parses a form and saves uploaded files
//! - `/handleException/` shows the error callback
//! - `/{action}/{paramA}-{paramB}` echoes its bindings

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::Method;
use clap::Parser;

use switchyard::config::validation::validate_config;
use switchyard::config::{load_config, ConfigError, ServerConfig};
use switchyard::lifecycle::signals::spawn_signal_handler;
use switchyard::net::Listener;
use switchyard::observability::{logging, metrics};
use switchyard::{parse_body_in_memory, HttpError, HttpResult, HttpServer, PreHookOutcome, Router, Shutdown, StaticFiles};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Demo server for the switchyard HTTP toolkit", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        static_root = %config.static_files.root.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let router = build_router(&config)?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    HttpServer::new(config, router).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_router(config: &ServerConfig) -> HttpResult<Router> {
    let site = Arc::new(StaticFiles::from_config(
        &config.static_files,
        config.limits.stream_chunk_bytes,
    ));
    let upload_dir = Arc::new(config.static_files.root.clone());

    let mut router = Router::new();

    router.before(|_rq, rp, _args| {
        Box::pin(async move {
            rp.with_cors();
            Ok::<_, HttpError>(PreHookOutcome::Continue)
        })
    });

    let index = Arc::clone(&site);
    router.get("/", move |rq, rp, _args| {
        let index = Arc::clone(&index);
        Box::pin(async move { index.serve(rq, rp).await.map(|_| ()) })
    })?;

    let files = Arc::clone(&site);
    let lookup = Arc::clone(&site);
    router.add_predicate(
        move |rq, args| {
            // Only GETs for files that exist; anything else falls through to the later routes.
            let is_file = *rq.method() == Method::GET
                && Path::new(rq.path()).extension().is_some()
                && lookup.map_path(rq.path()).is_some_and(|path| path.is_file());
            if is_file {
                args.insert("file", rq.path())?;
            }
            Ok(is_file)
        },
        move |rq, rp, _args| {
            let files = Arc::clone(&files);
            Box::pin(async move { files.serve(rq, rp).await.map(|_| ()) })
        },
    );

    router.post("/upload/", move |rq, rp, args| {
        let upload_dir = Arc::clone(&upload_dir);
        Box::pin(async move {
            let mut files = parse_body_in_memory(rq, args).await?;

            let mut saved = Vec::new();
            for (field, file) in files.iter_mut() {
                let Some(target) = Path::new(file.file_name()).file_name().map(|n| upload_dir.join(n)) else {
                    continue;
                };
                file.save(&target, true).await?;
                saved.push(format!("'{}: {}, {}'", field, file.file_name(), file.content_type()));
            }

            let fields: Vec<String> = args.iter().map(|(k, v)| format!("'{}: {}'", k, v)).collect();
            let body = format!("Form fields: {}\nFiles:       {}", fields.join(";  "), saved.join(";  "));
            rp.send_text(&body, "text/plain").await
        })
    })?;

    router.get("/handleException/", |_rq, _rp, _args| {
        Box::pin(async move { Err::<(), _>(HttpError::handler("My not implemented exception.")) })
    })?;

    router.get("/{action}/{paramA}-{paramB}", |_rq, rp, args| {
        Box::pin(async move {
            let body = format!(
                "action: {}\nparamA: {}\nparamB: {}",
                args.get("action").unwrap_or_default(),
                args.get("paramA").unwrap_or_default(),
                args.get("paramB").unwrap_or_default()
            );
            rp.send_text(&body, "text/plain").await
        })
    })?;

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use switchyard::{HttpRequest, HttpResponse};

    fn demo_router(root: &Path) -> Router {
        let mut config = ServerConfig::default();
        config.static_files.root = root.to_path_buf();
        build_router(&config).unwrap()
    }

    async fn run(router: &Router, method: &str, uri: &str, body: &'static str) -> (StatusCode, String, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let mut request = HttpRequest::from(request);
        let (mut response, receiver) = HttpResponse::channel();
        let (_, collected) = tokio::join!(
            async {
                router.dispatch(&mut request, &mut response).await;
                drop(response);
            },
            receiver.collect()
        );
        let (head, body) = collected.unwrap();
        let content_type = head
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (head.status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_static_files_only_for_existing_gets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "file body").unwrap();
        let router = demo_router(dir.path());

        let (status, _, body) = run(&router, "GET", "/a.txt", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "file body");

        let (status, _, body) = run(&router, "POST", "/a.txt", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_ne!(body, "file body");

        let (status, _, body) = run(&router, "GET", "/show/1.5-2", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "action: show\nparamA: 1.5\nparamB: 2");
    }

    #[tokio::test]
    async fn test_echoed_values_are_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let router = demo_router(dir.path());

        let (_, content_type, body) = run(&router, "GET", "/%3Cb%3E/x-y", "").await;
        assert_eq!(content_type, "text/plain");
        assert!(body.starts_with("action: %3Cb%3E"));

        let (status, content_type, body) = run(&router, "POST", "/upload/", "name=%3Cscript%3E").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain");
        assert!(body.contains("'name: <script>'"));
    }
}
