//! Resilient store client.
//!
//! Routes every call through a circuit breaker and turns every failure mode
//! into the operation's degraded default, so callers never handle store errors.
//!
//! | Operation            | Degraded default                      |
//! |----------------------|---------------------------------------|
//! | get                  | `None`                                |
//! | exists               | `0`                                   |
//! | ttl                  | `-2`                                  |
//! | increment            | `1`                                   |
//! | set, set_with_expiry | `"OK"` (`WriteAck::Degraded`), no-op  |
//! | expire               | `1`, no-op                            |
//! | del                  | number of keys requested, no-op       |
//! | ping                 | `"PONG"`                              |
//!
//! Degraded writes acknowledge success without storing anything. Callers must
//! use the store for idempotent, best-effort state only.
//!
//! A remote backend marked unhealthy is not called. The first call that finds it
//! so starts one background `check_connection`, so recovery does not depend on
//! the health monitor running.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState, FailureClassifier,
};
use crate::store::{FallbackStore, KvBackend, SetMode, StoreError, WriteAck};

/// Construction options for [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Breaker name used in logs and metrics.
    pub name: String,
    pub breaker: BreakerConfig,
    pub classifier: FailureClassifier,
    /// When false, calls are served by an in-memory [`FallbackStore`].
    pub backing_service_enabled: bool,
    /// Identical failures are logged on the 1st and every Nth occurrence.
    pub failure_log_every: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: "kv-store".to_string(),
            breaker: BreakerConfig::default(),
            classifier: FailureClassifier::always(),
            backing_service_enabled: true,
            failure_log_every: 10,
        }
    }
}

/// Where calls are served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackingMode {
    /// Real backend behind the breaker.
    Remote,
    /// In-process fallback store.
    InMemory,
    /// No backend at all; every call returns its degraded default.
    Absent,
}

/// Operational health summary for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub state: CircuitState,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    pub failure_count: u32,
    pub mode: BackingMode,
    /// Calls answered with a degraded default since startup.
    pub degraded_calls: u64,
}

enum Backing {
    Remote(Arc<dyn KvBackend>),
    InMemory(FallbackStore),
    Absent,
}

/// Occurrence counts per operation and error kind, for log rate limiting.
struct FailureLog {
    every: u64,
    seen: DashMap<String, u64>,
}

impl FailureLog {
    fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: DashMap::new(),
        }
    }

    /// Count one occurrence; `Some(n)` when this occurrence should be logged.
    fn record(&self, signature: String) -> Option<u64> {
        let mut count = self.seen.entry(signature).or_insert(0);
        *count += 1;
        let n = *count;
        (n == 1 || n % self.every == 0).then_some(n)
    }

    fn clear(&self) {
        if !self.seen.is_empty() {
            self.seen.clear();
        }
    }
}

/// Store client that degrades instead of failing.
pub struct ResilientClient {
    backing: Backing,
    breaker: CircuitBreaker,
    failures: FailureLog,
    recovering: Arc<AtomicBool>,
    degraded: AtomicU64,
}

impl ResilientClient {
    /// Guard `backend`. `None` yields a client that only serves degraded defaults.
    pub fn new(backend: Option<Arc<dyn KvBackend>>, options: ClientOptions) -> Self {
        let backing = match backend {
            _ if !options.backing_service_enabled => Backing::InMemory(FallbackStore::new()),
            Some(backend) => Backing::Remote(backend),
            None => {
                tracing::warn!(
                    store = %options.name,
                    "No backing store client; serving degraded defaults"
                );
                Backing::Absent
            }
        };
        Self::with_backing(backing, options)
    }

    /// Serve every call from a fresh in-memory store.
    pub fn in_memory(options: ClientOptions) -> Self {
        Self::with_backing(Backing::InMemory(FallbackStore::new()), options)
    }

    fn with_backing(backing: Backing, options: ClientOptions) -> Self {
        let breaker = CircuitBreaker::new(options.name, &options.breaker)
            .with_classifier(options.classifier);
        Self {
            backing,
            breaker,
            failures: FailureLog::new(options.failure_log_every),
            recovering: Arc::new(AtomicBool::new(false)),
            degraded: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> BackingMode {
        match self.backing {
            Backing::Remote(_) => BackingMode::Remote,
            Backing::InMemory(_) => BackingMode::InMemory,
            Backing::Absent => BackingMode::Absent,
        }
    }

    /// The breaker guarding the remote backend.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.call("get", None, |store| async move { store.get(key).await }).await
    }

    pub async fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> WriteAck {
        self.call("set", WriteAck::Degraded, |store| async move {
            store.set(key, value, mode).await.map(|()| WriteAck::Applied)
        })
        .await
    }

    pub async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> WriteAck {
        self.set(key, value, Some(SetMode::Ex(ttl_secs))).await
    }

    pub async fn increment(&self, key: &str) -> i64 {
        self.call("increment", 1, |store| async move { store.increment(key).await }).await
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> i64 {
        self.call("expire", 1, |store| async move { store.expire(key, ttl_secs).await }).await
    }

    pub async fn ttl(&self, key: &str) -> i64 {
        self.call("ttl", -2, |store| async move { store.ttl(key).await }).await
    }

    pub async fn exists(&self, key: &str) -> i64 {
        self.call("exists", 0, |store| async move { store.exists(key).await }).await
    }

    pub async fn del(&self, keys: &[&str]) -> i64 {
        self.call("del", keys.len() as i64, |store| async move { store.del(keys).await }).await
    }

    pub async fn ping(&self) -> String {
        self.call("ping", "PONG".to_string(), |store| async move { store.ping().await }).await
    }

    /// Breaker state combined with connection-level health.
    pub fn health_status(&self) -> HealthStatus {
        let snapshot = self.breaker.snapshot();
        let (connection_healthy, last_error, reconnect_attempts) = match &self.backing {
            Backing::Remote(backend) => {
                let health = backend.connection_health();
                (health.healthy, health.last_error, health.reconnect_attempts)
            }
            Backing::InMemory(_) => (true, None, 0),
            Backing::Absent => (false, Some("no backing store client".to_string()), 0),
        };

        HealthStatus {
            healthy: connection_healthy && snapshot.state != CircuitState::Open,
            state: snapshot.state,
            last_error,
            reconnect_attempts,
            failure_count: snapshot.failure_count,
            mode: self.mode(),
            degraded_calls: self.degraded.load(Ordering::Relaxed),
        }
    }

    /// Probe the remote backend, reconnecting if it is marked unhealthy.
    pub async fn check_connection(&self) -> bool {
        let healthy = match &self.backing {
            Backing::Remote(backend) => backend.check_connection().await,
            Backing::InMemory(_) => true,
            Backing::Absent => false,
        };
        metrics::record_store_health(healthy);
        healthy
    }

    async fn call<'a, T, F, Fut>(&'a self, op: &'static str, default: T, f: F) -> T
    where
        F: FnOnce(&'a dyn KvBackend) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + 'a,
    {
        let backend = match &self.backing {
            Backing::Absent => return self.degrade(op, default),
            Backing::InMemory(store) => {
                return match f(store as &dyn KvBackend).await {
                    Ok(value) => {
                        self.failures.clear();
                        value
                    }
                    Err(e) => {
                        self.log_failure(op, &e);
                        self.degrade(op, default)
                    }
                };
            }
            Backing::Remote(backend) => backend,
        };

        if !backend.connection_health().healthy {
            self.spawn_recovery(backend);
            return self.degrade(op, default);
        }

        match self.breaker.execute(|| f(backend.as_ref())).await {
            Ok(value) => {
                self.failures.clear();
                value
            }
            Err(BreakerError::Open(e)) => {
                tracing::debug!(
                    operation = op,
                    remaining_ms = e.remaining_ms,
                    "Circuit open; serving degraded default"
                );
                self.degrade(op, default)
            }
            Err(BreakerError::Failed(e)) => {
                self.log_failure(op, &e);
                self.degrade(op, default)
            }
        }
    }

    /// Start one background connection check unless one is already running.
    fn spawn_recovery(&self, backend: &Arc<dyn KvBackend>) {
        if self.recovering.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.recovering.store(false, Ordering::Release);
            return;
        };

        let backend = Arc::clone(backend);
        let recovering = Arc::clone(&self.recovering);
        let store = self.breaker.name().to_string();
        runtime.spawn(async move {
            let recovered = backend.check_connection().await;
            metrics::record_store_health(recovered);
            tracing::debug!(store = %store, recovered, "On-demand store recovery finished");
            recovering.store(false, Ordering::Release);
        });
    }

    fn degrade<T>(&self, op: &'static str, default: T) -> T {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        metrics::record_degraded(op);
        default
    }

    fn log_failure(&self, op: &'static str, error: &StoreError) {
        if let Some(occurrences) = self.failures.record(format!("{op}: {}", error.kind())) {
            tracing::error!(
                store = %self.breaker.name(),
                operation = op,
                error = %error,
                occurrences,
                state = %self.breaker.state(),
                "Backing store call failed"
            );
        }
    }
}
