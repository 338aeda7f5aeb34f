//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ID, open-connection tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
