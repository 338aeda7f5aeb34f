//! Single-range and conditional responses over a seekable source.
//!
//! # Responsibilities
//! - Answer `If-None-Match` / `If-Modified-Since` with 304
//! - Serve `Range: bytes=start-end` as 206 with `Content-Range`
//! - Stream the selected bytes in bounded chunks
//!
//! # Design Decisions
//! - One range per request; several `Range` headers are rejected
//! - The transfer buffer never exceeds `max_chunk`, so memory stays flat for
//!   large files
//! - A peer that disconnects mid-transfer is not an error
//!
//! # Data Flow
//! ```text
//! HttpRequest headers + ByteSource
//!     → validators (ETag, Last-Modified) → 304?
//!     → ByteRange::parse → 206 headers, or 200 for the whole source
//!     → seek(start) → read ≤ max_chunk → HttpResponse::write → ...
//! ```

use std::cmp::min;
use std::io::{self, SeekFrom};
use std::path::Path;

use axum::body::Bytes;
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::http::error::{HttpError, HttpResult};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::observability::metrics;
use crate::responder::conditional;
use crate::responder::source::{ByteSource, KnownSize};
use crate::responder::static_files;

/// Default cap on the transfer buffer.
pub const DEFAULT_MAX_CHUNK: usize = 8 * 1024 * 1024;

/// An inclusive byte range within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// The whole resource, or `None` when it is empty.
    pub fn full(total: u64) -> Option<Self> {
        total.checked_sub(1).map(|end| Self { start: 0, end })
    }

    /// Parse a `bytes=start-end` header value against a resource length.
    ///
    /// A missing end means the last byte, a missing start means the first
    /// byte, and an end past the resource is clamped.
    pub fn parse(value: &str, total: u64) -> HttpResult<Self> {
        let invalid = || HttpError::InvalidRangeHeader(value.to_string());

        let range_set = value.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        let (start, end) = range_set.split_once('-').ok_or_else(invalid)?;
        let last = total.checked_sub(1).ok_or_else(invalid)?;

        let start = match start.trim() {
            "" => 0,
            s => s.parse::<u64>().map_err(|_| invalid())?,
        };
        let end = match end.trim() {
            "" => last,
            e => min(e.parse::<u64>().map_err(|_| invalid())?, last),
        };

        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// How a response finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    NotModified,
    Full,
    Partial,
    /// The peer went away before the transfer completed.
    Aborted,
}

/// Serves byte sources with range and conditional support.
#[derive(Debug, Clone, Copy)]
pub struct RangeResponder {
    max_chunk: usize,
}

impl Default for RangeResponder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK)
    }
}

impl RangeResponder {
    pub fn new(max_chunk: usize) -> Self {
        Self {
            max_chunk: max_chunk.max(1),
        }
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Answer `request` from `source`.
    ///
    /// The source is dropped before returning. The response is closed on
    /// every successful path; on error it is left open so the error callback
    /// can still write.
    pub async fn respond<S: ByteSource>(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        mut source: S,
        mime: &str,
    ) -> HttpResult<Served> {
        let result = self.serve(request, response, &mut source, mime).await;
        drop(source);
        if result.is_ok() || response.headers_sent() {
            response.close();
        }
        result
    }

    async fn serve<S: ByteSource>(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        source: &mut S,
        mime: &str,
    ) -> HttpResult<Served> {
        let mut ranges = request.headers().get_all(header::RANGE).iter();
        let range_header = ranges.next();
        if ranges.next().is_some() {
            return Err(HttpError::InvalidRangeHeader(
                "multiple Range headers are not supported".to_string(),
            ));
        }
        let range_header = range_header
            .map(|v| v.to_str().map_err(|_| HttpError::InvalidRangeHeader("non-ASCII Range header".to_string())))
            .transpose()?;

        if range_header.is_none() {
            if let Some(modified) = source.last_modified() {
                let tag = conditional::etag(modified);
                response.try_set_header(header::ETAG.as_str(), &tag)?;
                response.try_set_header(header::LAST_MODIFIED.as_str(), &conditional::http_date(modified))?;
                if conditional::is_not_modified(request.headers(), &tag, modified) {
                    response.set_status(StatusCode::NOT_MODIFIED);
                    return Ok(Served::NotModified);
                }
            }
        }

        let total = source.len();
        let (range, served) = match range_header {
            Some(value) => {
                let range = ByteRange::parse(value, total)?;
                response
                    .set_status(StatusCode::PARTIAL_CONTENT)
                    .set_header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))
                    .set_keep_alive(true);
                response.try_set_header(header::CONTENT_RANGE.as_str(), &range.content_range(total))?;
                (Some(range), Served::Partial)
            }
            None => (ByteRange::full(total), Served::Full),
        };

        response.set_content_type(mime)?;
        response.set_content_length(range.map_or(0, |r| r.len()));

        let Some(range) = range else {
            return Ok(served);
        };
        match self.copy(response, source, range).await? {
            CopyEnd::Complete => Ok(served),
            CopyEnd::Disconnected => Ok(Served::Aborted),
        }
    }

    async fn copy<S: ByteSource>(
        &self,
        response: &mut HttpResponse,
        source: &mut S,
        range: ByteRange,
    ) -> HttpResult<CopyEnd> {
        source.seek(SeekFrom::Start(range.start)).await?;

        let mut remaining = range.len();
        let mut buffer = vec![0u8; min(remaining, self.max_chunk as u64) as usize];

        while remaining > 0 {
            let want = min(remaining, buffer.len() as u64) as usize;
            let read = source.read(&mut buffer[..want]).await?;
            if read == 0 {
                tracing::warn!(remaining, "Source ended before the advertised length");
                break;
            }

            match response.write(Bytes::copy_from_slice(&buffer[..read])).await {
                Ok(()) => remaining -= read as u64,
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!(error = %e, remaining, "Peer disconnected during transfer");
                    metrics::record_stream_abort();
                    if !response.headers_sent() {
                        response.set_status(StatusCode::NO_CONTENT);
                    }
                    return Ok(CopyEnd::Disconnected);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(CopyEnd::Complete)
    }
}

enum CopyEnd {
    Complete,
    Disconnected,
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Serve an in-memory buffer. No validators are sent.
pub async fn send_bytes(
    request: &HttpRequest,
    response: &mut HttpResponse,
    data: impl Into<Bytes>,
    mime: &str,
) -> HttpResult<Served> {
    RangeResponder::default()
        .respond(request, response, KnownSize::bytes(data), mime)
        .await
}

/// Serve a file, picking the content type from its extension.
///
/// A missing file sets 404 and fails with `ResourceNotFound`.
pub async fn send_file(
    request: &HttpRequest,
    response: &mut HttpResponse,
    path: impl AsRef<Path>,
) -> HttpResult<Served> {
    send_file_with(&RangeResponder::default(), request, response, path).await
}

/// `send_file` with an explicit responder.
pub async fn send_file_with(
    responder: &RangeResponder,
    request: &HttpRequest,
    response: &mut HttpResponse,
    path: impl AsRef<Path>,
) -> HttpResult<Served> {
    let path = path.as_ref();
    let source = match KnownSize::file(path).await {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            response.set_status(StatusCode::NOT_FOUND);
            return Err(HttpError::ResourceNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    responder
        .respond(request, response, source, static_files::content_type(path))
        .await
}
