//! Error taxonomy shared by routing, body parsing and responders.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while dispatching or serving a request.
///
/// Every variant that reaches `Router::dispatch` is handed to the configured
/// error callback; none of them escapes the dispatch boundary.
#[derive(Debug, Error)]
pub enum HttpError {
    /// No route predicate accepted the request.
    #[error("Route {0} not found.")]
    RouteNotFound(String),

    /// Body parsing was requested for a content type it cannot decode.
    #[error("The body content-type is not supported: {0}")]
    UnsupportedContentType(String),

    /// The multipart envelope could not be interpreted.
    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(String),

    /// The `Range` header was repeated or could not be parsed.
    #[error("Invalid Range header: {0}")]
    InvalidRangeHeader(String),

    /// A file-backed response target does not exist.
    #[error("The file '{0}' was not found.")]
    ResourceNotFound(String),

    /// A key was inserted twice into an argument or file map.
    #[error("An item with the same key has already been added. Key: {0}")]
    DuplicateKey(String),

    /// A route pattern failed to compile.
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failure raised by a route handler or pre-hook.
    #[error("{0}")]
    Handler(String),

    /// Underlying stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        HttpError::Handler(message.into())
    }

    /// Status code conventionally associated with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::RouteNotFound(_) | HttpError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            HttpError::UnsupportedContentType(_)
            | HttpError::MalformedMultipart(_)
            | HttpError::InvalidRangeHeader(_)
            | HttpError::DuplicateKey(_)
            | HttpError::Handler(_) => StatusCode::BAD_REQUEST,
            HttpError::InvalidPattern { .. } | HttpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type HttpResult<T> = Result<T, HttpError>;
