//! Metrics collection and exposition.
//!
//! # Metrics
//! - `kv_guard_breaker_state` (gauge): 0=closed, 1=half-open, 2=open, per breaker
//! - `kv_guard_breaker_transitions_total` (counter): by breaker, from, to
//! - `kv_guard_breaker_fast_fails_total` (counter): calls rejected while open
//! - `kv_guard_degraded_total` (counter): degraded defaults served, by operation
//! - `kv_guard_store_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `kv_guard_store_reconnects_total` (counter): reconnect attempts, by outcome
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("kv_guard_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "kv_guard_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_fast_fail(breaker: &str) {
    counter!("kv_guard_breaker_fast_fails_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_degraded(operation: &'static str) {
    counter!("kv_guard_degraded_total", "operation" => operation).increment(1);
}

pub fn record_store_health(healthy: bool) {
    gauge!("kv_guard_store_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_reconnect(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("kv_guard_store_reconnects_total", "outcome" => outcome).increment(1);
}
