//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces:
//!     → logging.rs (one structured access record per request)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers (external):
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log record of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
