//! Fault-isolation layer for the permit portal's key-value store.
//!
//! A circuit breaker plus a resilient client that keeps callers working when
//! the store is slow, failing or missing, by fast-failing and serving safe
//! per-operation defaults.

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;

pub use config::schema::GuardConfig;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitState, FailureClassifier};
pub use store::{ResilientClient, WriteAck};
