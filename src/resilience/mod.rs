//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backing store:
//!     → circuit_breaker.rs (fast-fail while open, track outcomes)
//!     → classifier.rs (decide whether a failure counts)
//!     → timeouts.rs (per-command deadline inside the transport)
//!
//! Lost connection:
//!     → backoff.rs (delay between reconnect attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts belong to the transport, never to the breaker
//! - Expected errors can be excluded from the failure budget
//! - Circuit breaker prevents cascading failures and wasted latency

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitOpenError, CircuitState,
};
pub use classifier::FailureClassifier;
