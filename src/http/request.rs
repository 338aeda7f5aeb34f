//! Request side of the transport boundary.
//!
//! # Responsibilities
//! - Expose method, path+query and headers of a pre-parsed request
//! - Provide a forward-only body byte source for the body parsers
//!
//! # Design Decisions
//! - The body is pulled chunk by chunk from the transport; nothing buffers the
//!   whole payload unless a caller asks for `read_to_end`
//! - Header lookups are case-insensitive (delegated to `HeaderMap`)

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, Uri};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

/// Forward-only byte source over a request body.
///
/// The stream is only reached through `Mutex::get_mut`; the lock is never
/// taken. It keeps `HttpRequest` `Sync`.
pub struct BodyReader {
    stream: Mutex<BoxStream<'static, io::Result<Bytes>>>,
    chunk: Bytes,
    pos: usize,
    consumed: u64,
}

impl BodyReader {
    /// A body with no bytes.
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// A body backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let mut reader = Self::empty();
        reader.chunk = bytes.into();
        reader
    }

    /// A body backed by an arbitrary chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Mutex::new(stream.boxed()),
            chunk: Bytes::new(),
            pos: 0,
            consumed: 0,
        }
    }

    /// Adapt a transport body.
    pub fn from_body(body: Body) -> Self {
        Self::from_stream(body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other)))
    }

    /// Make sure the current chunk has unread bytes. Returns false at end of body.
    async fn fill(&mut self) -> io::Result<bool> {
        let stream = self.stream.get_mut().unwrap_or_else(PoisonError::into_inner);
        while self.pos >= self.chunk.len() {
            match stream.next().await {
                Some(chunk) => {
                    self.chunk = chunk?;
                    self.pos = 0;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Read a single byte, `None` at end of body.
    pub async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if !self.fill().await? {
            return Ok(None);
        }
        let byte = self.chunk[self.pos];
        self.pos += 1;
        self.consumed += 1;
        Ok(Some(byte))
    }

    /// Read one line terminated by `\n`, stripping a trailing `\r`.
    ///
    /// Returns `None` only when the body is already exhausted.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut saw_any = false;
        while let Some(byte) = self.read_byte().await? {
            saw_any = true;
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        if !saw_any {
            return Ok(None);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Drain the remaining body into memory.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while self.fill().await? {
            out.extend_from_slice(&self.chunk[self.pos..]);
            self.consumed += (self.chunk.len() - self.pos) as u64;
            self.pos = self.chunk.len();
        }
        Ok(out)
    }

    /// Number of bytes handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl std::fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyReader")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

/// A pre-parsed HTTP request as handed to the router.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: BodyReader,
}

impl HttpRequest {
    /// Assemble a request from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: BodyReader) -> Self {
        Self {
            method,
            uri,
            headers,
            remote_addr: None,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path component without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path followed by `?query` when present. This is what route patterns see.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// The forward-only body source.
    pub fn body_mut(&mut self) -> &mut BodyReader {
        &mut self.body
    }
}

impl From<Request<Body>> for HttpRequest {
    fn from(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let mut converted = Self::new(parts.method, parts.uri, parts.headers, BodyReader::from_body(body));
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            converted.set_remote_addr(*addr);
        }
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let mut body = BodyReader::from_bytes("first\r\nsecond\nlast");
        assert_eq!(body.read_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(body.read_line().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(body.read_line().await.unwrap(), Some(b"last".to_vec()));
        assert_eq!(body.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"c")),
        ];
        let mut body = BodyReader::from_stream(stream::iter(chunks));
        assert_eq!(body.read_byte().await.unwrap(), Some(b'a'));
        assert_eq!(body.read_to_end().await.unwrap(), b"bc".to_vec());
        assert_eq!(body.read_byte().await.unwrap(), None);
        assert_eq!(body.consumed(), 3);
    }

    #[test]
    fn test_request_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BodyReader>();
        assert_send_sync::<HttpRequest>();
    }

    #[test]
    fn test_path_and_query() {
        let request = Request::builder()
            .uri("http://localhost/items/7?sort=asc")
            .body(Body::empty())
            .unwrap();
        let request = HttpRequest::from(request);
        assert_eq!(request.path(), "/items/7");
        assert_eq!(request.query(), Some("sort=asc"));
        assert_eq!(request.path_and_query(), "/items/7?sort=asc");
    }
}
