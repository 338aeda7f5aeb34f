//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1, axum service, body limit, trace layer)
//!     → request.rs (method, path+query, headers, streaming body)
//!     → routing::Router::dispatch
//!     → response.rs (head + body over channels)
//!     → Send to client
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use error::{HttpError, HttpResult};
pub use request::{BodyReader, HttpRequest};
pub use response::{HttpResponse, ResponseHead, ResponseReceiver};
pub use server::HttpServer;
