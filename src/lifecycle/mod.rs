//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → In-flight requests finish → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept first, then let connections drain

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
