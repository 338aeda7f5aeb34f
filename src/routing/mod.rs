//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path+query, headers)
//!     → router.rs (pre-hook, then routes in registration order)
//!     → matcher.rs (method check + pattern match, bindings into ArgMap)
//!     → handler of the first accepting route
//!     → error callback on any failure or on no match
//!
//! Route Compilation (at startup):
//!     pattern "{name}" text
//!     → Pattern (case-insensitive expression, last placeholder greedy)
//!     → appended to the route table
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable while serving
//! - First match wins (registration order is priority)
//! - Exactly one handler runs per request
//! - Fresh ArgMap per request, cleared between failed predicates

pub mod args;
pub mod matcher;
pub mod router;

pub use args::ArgMap;
pub use matcher::{MatchOutcome, MethodPattern, Pattern, RoutePredicate};
pub use router::{
    default_error_handler, BoxFuture, ErrorHandler, Handler, HandlerFuture, PreHook, PreHookOutcome, Router,
};
