//! Static files under a root directory.

use std::path::{Component, Path, PathBuf};

use crate::config::schema::StaticFilesConfig;
use crate::http::error::{HttpError, HttpResult};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::responder::range::{send_file_with, RangeResponder, Served};

/// Maps URL paths onto files below `root`.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index: String,
    responder: RangeResponder,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, index: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            index: index.into(),
            responder: RangeResponder::default(),
        }
    }

    pub fn from_config(config: &StaticFilesConfig, max_chunk: usize) -> Self {
        Self::new(&config.root, &config.index).with_responder(RangeResponder::new(max_chunk))
    }

    pub fn with_responder(mut self, responder: RangeResponder) -> Self {
        self.responder = responder;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a URL path, refusing anything that would leave the root.
    /// Directory-like paths resolve to the index file.
    pub fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let url_path = url_path.split(['?', '#']).next().unwrap_or("");
        let decoded = urlencoding::decode(url_path).ok()?;

        let mut path = self.root.clone();
        for component in Path::new(decoded.trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => path.push(segment),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if decoded.is_empty() || decoded.ends_with('/') {
            path.push(&self.index);
        }
        Some(path)
    }

    /// Serve the file behind the request path.
    pub async fn serve(&self, request: &HttpRequest, response: &mut HttpResponse) -> HttpResult<Served> {
        let Some(path) = self.map_path(request.path()) else {
            response.set_status(axum::http::StatusCode::NOT_FOUND);
            return Err(HttpError::ResourceNotFound(request.path().to_string()));
        };
        send_file_with(&self.responder, request, response, path).await
    }
}

/// Content type for a file extension.
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
