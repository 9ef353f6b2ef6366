use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::{BreakerSnapshot, CircuitState};
use crate::store::HealthStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

/// JSON view of a breaker snapshot.
#[derive(Debug, Serialize)]
pub struct BreakerReport {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_success_threshold: u32,
    pub failure_count: u32,
    pub success_count: u32,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub ms_since_last_failure: Option<u64>,
    pub time_in_current_state_ms: u64,
}

impl From<BreakerSnapshot> for BreakerReport {
    fn from(snap: BreakerSnapshot) -> Self {
        Self {
            name: snap.name,
            state: snap.state,
            failure_threshold: snap.failure_threshold,
            reset_timeout_ms: snap.reset_timeout.as_millis() as u64,
            half_open_success_threshold: snap.half_open_success_threshold,
            failure_count: snap.failure_count,
            success_count: snap.success_count,
            consecutive_failures: snap.consecutive_failures,
            consecutive_successes: snap.consecutive_successes,
            total_calls: snap.total_calls,
            total_failures: snap.total_failures,
            total_successes: snap.total_successes,
            ms_since_last_failure: snap.last_failure_time.map(|t| t.elapsed().as_millis() as u64),
            time_in_current_state_ms: snap.time_in_current_state.as_millis() as u64,
        }
    }
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_health(State(state): State<AdminState>) -> Json<HealthStatus> {
    Json(state.client.health_status())
}

pub async fn get_breaker(State(state): State<AdminState>) -> Json<BreakerReport> {
    Json(state.client.breaker_snapshot().into())
}

pub async fn reset_breaker(State(state): State<AdminState>) -> Json<BreakerReport> {
    tracing::warn!(breaker = %state.client.breaker().name(), "Circuit breaker reset via admin API");
    state.client.breaker().reset();
    Json(state.client.breaker_snapshot().into())
}
