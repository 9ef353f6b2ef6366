//! Circuit breaker for backing store protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: probing whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold on a counted failure
//! Open → Half-Open: lazily, on the next call once reset_timeout has elapsed
//! Half-Open → Closed: success_count >= half_open_success_threshold
//! Half-Open → Open: any counted failure
//! any → Closed: reset()
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, owned by the client that guards it
//! - Fail fast in Open state (the wrapped operation is never invoked)
//! - No timeout on the wrapped operation; the transport enforces deadlines
//! - Counters sit behind a mutex that is never held across an await

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::classifier::FailureClassifier;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised instead of invoking the operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open; retry in {remaining_ms}ms")]
pub struct CircuitOpenError {
    pub name: String,
    /// Time left until the next call is allowed through as a half-open probe.
    pub remaining_ms: u64,
}

impl CircuitOpenError {
    pub fn remaining(&self) -> Duration {
        Duration::from_millis(self.remaining_ms)
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Fast-failed without invoking the operation.
    Open(CircuitOpenError),
    /// The operation ran and returned this error.
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Failed(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open(e) => write!(f, "{}", e),
            BreakerError::Failed(e) => write!(f, "operation failed: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Open(e) => Some(e),
            BreakerError::Failed(e) => Some(e),
        }
    }
}

/// Point-in-time copy of a breaker's state and counters.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_success_threshold: u32,
    pub failure_count: u32,
    pub success_count: u32,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_failure_time: Option<Instant>,
    pub last_state_change_time: Instant,
    pub time_in_current_state: Duration,
}

#[derive(Debug)]
struct Counters {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    consecutive_failures: u64,
    consecutive_successes: u64,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    last_failure_time: Option<Instant>,
    last_state_change_time: Instant,
}

/// Generic circuit breaker around asynchronous operations.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_success_threshold: u32,
    classifier: FailureClassifier,
    counters: Mutex<Counters>,
}

impl CircuitBreaker {
    /// Create a closed breaker that counts every failure.
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
            half_open_success_threshold: config.half_open_success_threshold,
            classifier: FailureClassifier::always(),
            counters: Mutex::new(Counters {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                consecutive_failures: 0,
                consecutive_successes: 0,
                total_calls: 0,
                total_failures: 0,
                total_successes: 0,
                last_failure_time: None,
                last_state_change_time: Instant::now(),
            }),
        }
    }

    /// Replace the failure classifier.
    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Does not perform the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// The operation's error is always handed back to the caller, whether or
    /// not the classifier counted it.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.admit().map_err(BreakerError::Open)?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure(&err);
                Err(BreakerError::Failed(err))
            }
        }
    }

    /// Administrative override: close the circuit and clear the state counters.
    pub fn reset(&self) {
        let mut counters = self.lock();
        counters.failure_count = 0;
        counters.success_count = 0;
        if counters.state == CircuitState::Closed {
            counters.last_state_change_time = Instant::now();
            tracing::info!(breaker = %self.name, "Circuit breaker reset while closed");
        } else {
            self.transition(&mut counters, CircuitState::Closed);
        }
    }

    /// Administrative override: open the circuit now, restarting the reset timeout.
    pub fn force_open(&self) {
        let mut counters = self.lock();
        if counters.state == CircuitState::Open {
            counters.last_state_change_time = Instant::now();
        } else {
            self.transition(&mut counters, CircuitState::Open);
        }
    }

    /// Immutable copy of every field plus the time spent in the current state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let counters = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: counters.state,
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            half_open_success_threshold: self.half_open_success_threshold,
            failure_count: counters.failure_count,
            success_count: counters.success_count,
            consecutive_failures: counters.consecutive_failures,
            consecutive_successes: counters.consecutive_successes,
            total_calls: counters.total_calls,
            total_failures: counters.total_failures,
            total_successes: counters.total_successes,
            last_failure_time: counters.last_failure_time,
            last_state_change_time: counters.last_state_change_time,
            time_in_current_state: counters.last_state_change_time.elapsed(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<(), CircuitOpenError> {
        let mut counters = self.lock();
        counters.total_calls += 1;

        if counters.state == CircuitState::Open {
            let elapsed = counters.last_state_change_time.elapsed();
            if elapsed < self.reset_timeout {
                drop(counters);
                let remaining = self.reset_timeout - elapsed;
                metrics::record_fast_fail(&self.name);
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    remaining_ms: remaining.as_micros().div_ceil(1000) as u64,
                });
            }
            self.transition(&mut counters, CircuitState::HalfOpen);
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut counters = self.lock();
        counters.total_successes += 1;
        counters.consecutive_successes += 1;
        counters.consecutive_failures = 0;

        if counters.state == CircuitState::HalfOpen {
            counters.success_count += 1;
            if counters.success_count >= self.half_open_success_threshold {
                self.transition(&mut counters, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, err: &(dyn Error + 'static)) {
        let counted = self.classifier.counts(err);

        let mut counters = self.lock();
        counters.total_failures += 1;
        counters.consecutive_failures += 1;
        counters.consecutive_successes = 0;
        counters.last_failure_time = Some(Instant::now());

        if !counted {
            tracing::debug!(
                breaker = %self.name,
                error = %err,
                "Failure not counted by classifier"
            );
            return;
        }

        match counters.state {
            CircuitState::HalfOpen => self.transition(&mut counters, CircuitState::Open),
            CircuitState::Closed => {
                counters.failure_count += 1;
                if counters.failure_count >= self.failure_threshold {
                    self.transition(&mut counters, CircuitState::Open);
                }
            }
            // A call admitted before the circuit opened; already tripped.
            CircuitState::Open => {}
        }
    }

    fn transition(&self, counters: &mut Counters, to: CircuitState) {
        let from = counters.state;
        counters.state = to;
        counters.last_state_change_time = Instant::now();
        match to {
            CircuitState::Closed => counters.failure_count = 0,
            CircuitState::HalfOpen => counters.success_count = 0,
            CircuitState::Open => {}
        }

        tracing::warn!(
            breaker = %self.name,
            from = %from,
            to = %to,
            failure_count = counters.failure_count,
            consecutive_failures = counters.consecutive_failures,
            "Circuit breaker state changed"
        );
        metrics::record_breaker_transition(&self.name, from, to);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("half_open_success_threshold", &self.half_open_success_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(failure_threshold: u32, reset_timeout_ms: u64, half_open: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            &BreakerConfig {
                failure_threshold,
                reset_timeout_ms,
                half_open_success_threshold: half_open,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<io::Error>> {
        cb.execute(|| async { Err(io::Error::new(io::ErrorKind::Other, "boom")) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<io::Error>> {
        cb.execute(|| async { Ok(7) }).await
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let cb = breaker(3, 1000, 2);
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.total_calls, 0);
        assert!(snap.last_failure_time.is_none());
    }

    #[tokio::test]
    async fn test_opens_exactly_on_threshold() {
        let cb = breaker(3, 1000, 2);

        for expected in 1..=2 {
            assert!(matches!(fail(&cb).await, Err(BreakerError::Failed(_))));
            assert_eq!(cb.state(), CircuitState::Closed);
            assert_eq!(cb.snapshot().failure_count, expected);
        }

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_fast_fails_without_invoking() {
        let cb = breaker(1, 10_000, 1);
        let _ = fail(&cb).await;

        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let result: Result<u32, BreakerError<io::Error>> = cb
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
            match result {
                Err(BreakerError::Open(e)) => {
                    assert_eq!(e.name, "test");
                    assert!(e.remaining_ms > 9_000 && e.remaining_ms <= 10_000);
                }
                other => panic!("expected fast-fail, got {:?}", other),
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let snap = cb.snapshot();
        assert_eq!(snap.total_calls, 6);
        assert_eq!(snap.total_failures, 1);
        assert_eq!(snap.failure_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_probe_after_timeout() {
        let cb = breaker(1, 50, 2);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let calls = AtomicU32::new(0);
        let result: Result<u32, BreakerError<io::Error>> = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.success_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successes() {
        let cb = breaker(2, 20, 3);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
    }

    #[tokio::test]
    async fn test_half_open_single_failure_reopens() {
        let cb = breaker(1, 20, 5);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.snapshot().success_count, 2);

        assert!(matches!(fail(&cb).await, Err(BreakerError::Failed(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(succeed(&cb).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn test_uncounted_failure_propagates_without_tripping() {
        let cb = breaker(1, 1000, 1).with_classifier(FailureClassifier::for_error::<io::Error, _>(
            |e| e.kind() != io::ErrorKind::NotFound,
        ));

        let result: Result<(), BreakerError<io::Error>> = cb
            .execute(|| async { Err(io::Error::new(io::ErrorKind::NotFound, "no such key")) })
            .await;

        let err = result.unwrap_err().into_inner().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.total_failures, 1);
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_lifetime_counters() {
        let cb = breaker(10, 1000, 1);
        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;

        let snap = cb.snapshot();
        assert_eq!(snap.total_calls, 3);
        assert_eq!(snap.total_successes, 2);
        assert_eq!(snap.total_failures, 1);
        assert_eq!(snap.consecutive_failures, 1);
        assert_eq!(snap.consecutive_successes, 0);
        assert!(snap.last_failure_time.is_some());
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let cb = breaker(1, 60_000, 1);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.total_failures, 1);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_force_open() {
        let cb = breaker(5, 60_000, 1);
        cb.force_open();
        assert!(succeed(&cb).await.unwrap_err().is_open());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&CircuitState::HalfOpen).unwrap(), "\"HALF_OPEN\"");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
