//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → tracing.rs (per-request spans with correlation IDs)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every event of a dispatch
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;
