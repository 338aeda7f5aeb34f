//! Response side of the transport boundary.
//!
//! # Responsibilities
//! - Hold status, headers and keep-alive flag until the head is committed
//! - Stream body bytes to the transport with backpressure
//! - Report peer disconnects as `ConnectionAborted` write errors
//!
//! # Design Decisions
//! - The head is committed on the first body write or on close, whichever
//!   comes first; later status/header changes are ignored by the transport
//! - The body travels over a bounded channel so a slow client throttles the
//!   handler instead of growing memory
//! - Dropping an `HttpResponse` closes it

use std::convert::Infallible;
use std::io;

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderValue, IntoHeaderName};
use axum::http::{HeaderMap, Response, StatusCode};
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::http::error::{HttpError, HttpResult};

/// Body chunks buffered between a handler and the transport.
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Status line and headers as committed to the transport.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub keep_alive: bool,
}

/// Output sink handed to handlers.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    keep_alive: bool,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
}

/// Transport end of an `HttpResponse`.
#[derive(Debug)]
pub struct ResponseReceiver {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Bytes>,
}

impl HttpResponse {
    /// Create a response and the receiver the transport reads it from.
    pub fn channel() -> (HttpResponse, ResponseReceiver) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            keep_alive: true,
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
        };
        (response, ResponseReceiver { head_rx, body_rx })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any previous value.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a header from string parts.
    pub fn try_set_header(&mut self, name: &str, value: &str) -> HttpResult<&mut Self> {
        let name = header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::handler(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::handler(format!("invalid header value '{}': {}", value, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn set_content_type(&mut self, mime: &str) -> HttpResult<&mut Self> {
        self.try_set_header(header::CONTENT_TYPE.as_str(), mime)
    }

    pub fn set_content_length(&mut self, length: u64) -> &mut Self {
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        self
    }

    /// Append a `Set-Cookie` header.
    pub fn add_cookie(&mut self, name: &str, value: &str) -> HttpResult<&mut Self> {
        let cookie = HeaderValue::from_str(&format!("{}={}", name, value))
            .map_err(|e| HttpError::handler(format!("invalid cookie '{}': {}", name, e)))?;
        self.headers.append(header::SET_COOKIE, cookie);
        Ok(self)
    }

    /// Allow cross-origin GET/POST from any origin.
    pub fn with_cors(&mut self) -> &mut Self {
        self.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        self.set_header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(
                "Cache-Control, Pragma, Accept, Origin, Authorization, Content-Type, X-Requested-With",
            ),
        );
        self.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST"));
        self.set_header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"))
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    /// True once status and headers have been handed to the transport.
    pub fn headers_sent(&self) -> bool {
        self.head_tx.is_none()
    }

    /// True once the body stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.body_tx.is_none()
    }

    fn commit_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            let head = ResponseHead {
                status: self.status,
                headers: self.headers.clone(),
                keep_alive: self.keep_alive,
            };
            // A missing receiver surfaces on the next body write.
            let _ = tx.send(head);
        }
    }

    /// Write body bytes, committing the head first if needed.
    ///
    /// A peer that has gone away fails with `ConnectionAborted`; if that is
    /// detected before the first write, the head stays uncommitted.
    pub async fn write(&mut self, data: impl Into<Bytes>) -> io::Result<()> {
        let disconnected = || io::Error::new(io::ErrorKind::ConnectionAborted, "peer disconnected");
        match &self.body_tx {
            None => return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response already closed")),
            Some(tx) if tx.is_closed() => return Err(disconnected()),
            Some(_) => {}
        }
        self.commit_head();
        let Some(tx) = self.body_tx.as_ref() else {
            return Err(disconnected());
        };
        tx.send(data.into())
            .await
            .map_err(|_| disconnected())
    }

    /// Commit the head (if still pending) and end the body.
    pub fn close(&mut self) {
        self.commit_head();
        self.body_tx = None;
    }

    /// Write a complete text body and close the response.
    pub async fn send_text(&mut self, text: &str, mime: &str) -> HttpResult<()> {
        self.set_content_type(mime)?;
        self.set_content_length(text.len() as u64);
        self.write(Bytes::copy_from_slice(text.as_bytes())).await?;
        self.close();
        Ok(())
    }

    /// Redirect with `302 Found` and close the response.
    pub fn redirect(&mut self, location: &str) -> HttpResult<()> {
        self.set_status(StatusCode::FOUND);
        self.try_set_header(header::LOCATION.as_str(), location)?;
        self.close();
        Ok(())
    }
}

impl Drop for HttpResponse {
    fn drop(&mut self) {
        self.close();
    }
}

impl ResponseReceiver {
    /// Wait for the head, then hand back the head and the body channel.
    pub async fn into_parts(self) -> Option<(ResponseHead, mpsc::Receiver<Bytes>)> {
        let head = self.head_rx.await.ok()?;
        Some((head, self.body_rx))
    }

    /// Buffer the whole response. Intended for tests and small in-process calls.
    pub async fn collect(self) -> Option<(ResponseHead, Vec<u8>)> {
        let (head, mut body_rx) = self.into_parts().await?;
        let mut body = Vec::new();
        while let Some(chunk) = body_rx.recv().await {
            body.extend_from_slice(&chunk);
        }
        Some((head, body))
    }

    /// Build a streaming transport response.
    pub async fn into_response(self) -> Response<Body> {
        let Some((head, body_rx)) = self.into_parts().await else {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        };

        let body = stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        });

        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        if !head.keep_alive {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}
