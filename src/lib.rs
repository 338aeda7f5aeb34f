//! Minimal HTTP toolkit: ordered pattern routing, streaming multipart
//! parsing and byte-range file responses over a hyper/tokio transport.

// Core subsystems
pub mod body;
pub mod config;
pub mod http;
pub mod net;
pub mod responder;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use body::{parse_body, parse_body_in_memory, HttpFile};
pub use config::ServerConfig;
pub use http::{HttpError, HttpRequest, HttpResponse, HttpResult, HttpServer};
pub use lifecycle::Shutdown;
pub use responder::{send_bytes, send_file, RangeResponder, StaticFiles};
pub use routing::{ArgMap, PreHookOutcome, Router};
