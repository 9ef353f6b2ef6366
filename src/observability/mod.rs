//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breaker, client and store produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON when configured)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Breaker transitions log at warn, store failures at error
//! - Repeated identical failures are rate-limited at the call site
//! - Metrics are cheap (no-op without an installed recorder)

pub mod logging;
pub mod metrics;
