//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kv_guard::store::{ConnectionHealth, FallbackStore, KvBackend, SetMode, StoreError};

/// Backend whose calls can be switched to fail, backed by an in-memory store.
///
/// While unhealthy, `check_connection` acts as one reconnect attempt: it fails
/// as many times as scripted, then restores the connection.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub store: FallbackStore,
    failing: Arc<AtomicBool>,
    unhealthy: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
    reconnect_failures_left: Arc<AtomicU32>,
    reconnect_attempts: Arc<AtomicU32>,
    checks: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Report the connection as unhealthy without failing calls.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// The next `n` reconnect attempts fail.
    pub fn fail_reconnects(&self, n: u32) {
        self.reconnect_failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of operations that reached this backend.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `check_connection` invocations.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            let err = std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            );
            return Err(StoreError::Transport(err.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for ScriptedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.enter()?;
        Ok(self.store.get(key))
    }

    async fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> Result<(), StoreError> {
        self.enter()?;
        self.store.set(key, value, mode)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.enter()?;
        self.store.increment(key)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<i64, StoreError> {
        self.enter()?;
        self.store.expire(key, ttl_secs)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.enter()?;
        Ok(self.store.ttl(key))
    }

    async fn exists(&self, key: &str) -> Result<i64, StoreError> {
        self.enter()?;
        Ok(self.store.exists(key))
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, StoreError> {
        self.enter()?;
        Ok(self.store.del(keys))
    }

    async fn ping(&self) -> Result<String, StoreError> {
        self.enter()?;
        Ok("PONG".to_string())
    }

    fn connection_health(&self) -> ConnectionHealth {
        let healthy = !self.unhealthy.load(Ordering::SeqCst);
        ConnectionHealth {
            healthy,
            last_error: (!healthy).then(|| "connection refused".to_string()),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
        }
    }

    async fn check_connection(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if !self.unhealthy.load(Ordering::SeqCst) {
            return self.ping().await.is_ok();
        }

        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .reconnect_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return false;
        }
        self.unhealthy.store(false, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        true
    }
}
