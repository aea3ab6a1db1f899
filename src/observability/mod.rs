//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Driver loop and server produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (outcome counters, depth histogram)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line via the request-id middleware
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
