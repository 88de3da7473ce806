//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (logging.rs installs the sink)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout, pretty or JSON
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the HTTP layer into the dispatch span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
