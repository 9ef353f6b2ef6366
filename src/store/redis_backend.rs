//! Redis-protocol backend.
//!
//! # Responsibilities
//! - Hold the connection and run commands under a per-command deadline
//! - Track connection health (healthy flag, last error, reconnect attempts)
//! - Detect errors that require a fresh connection and reconnect with backoff
//!
//! # Design Decisions
//! - Structured error kinds decide reconnects first; message matching is a
//!   last resort and its list is not assumed complete
//! - Connection replacement is an atomic pointer swap; in-flight commands keep
//!   the connection they started with

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, RedisError};

use crate::config::{ReconnectConfig, StoreConfig};
use crate::observability::metrics;
use crate::resilience::backoff::reconnect_delay;
use crate::resilience::timeouts::with_deadline;
use crate::store::{ConnectionHealth, KvBackend, SetMode, StoreError};

/// Error message fragments that indicate the connection must be replaced.
/// Only consulted when the structured error kind is inconclusive.
const RECONNECT_MARKERS: &[&str] = &["READONLY", "ECONNREFUSED", "ECONNRESET", "ETIMEDOUT"];

/// Whether `err` means the current connection is unusable.
pub fn needs_reconnect(err: &StoreError) -> bool {
    match err {
        StoreError::Transport(e) => transport_needs_reconnect(e),
        StoreError::Unavailable(_) => true,
        StoreError::Timeout(_) | StoreError::NotAnInteger(_) | StoreError::InvalidExpiry(_) => {
            false
        }
    }
}

fn transport_needs_reconnect(err: &RedisError) -> bool {
    if matches!(err.kind(), ErrorKind::ReadOnly) {
        return true;
    }
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        return true;
    }
    let message = err.to_string();
    RECONNECT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Backend speaking to a real Redis server.
pub struct RedisBackend {
    client: redis::Client,
    conn: ArcSwap<ConnectionManager>,
    command_timeout: Duration,
    connect_timeout: Duration,
    reconnect: ReconnectConfig,
    healthy: AtomicBool,
    reconnect_attempts: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl RedisBackend {
    /// Open a connection within the configured connect deadline.
    pub async fn connect(
        config: &StoreConfig,
        reconnect: ReconnectConfig,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = open_manager(&client, config.connect_timeout()).await?;

        tracing::info!(url = %redacted(&config.url), "Connected to backing store");
        metrics::record_store_health(true);

        Ok(Self {
            client,
            conn: ArcSwap::from_pointee(conn),
            command_timeout: config.command_timeout(),
            connect_timeout: config.connect_timeout(),
            reconnect,
            healthy: AtomicBool::new(true),
            reconnect_attempts: AtomicU32::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// One reconnect attempt, preceded by the backoff delay for this attempt number.
    pub async fn reconnect(&self) -> bool {
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = reconnect_delay(attempt, &self.reconnect);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to backing store"
        );
        tokio::time::sleep(delay).await;

        match open_manager(&self.client, self.connect_timeout).await {
            Ok(conn) => {
                self.conn.store(std::sync::Arc::new(conn));
                self.healthy.store(true, Ordering::Release);
                self.reconnect_attempts.store(0, Ordering::Release);
                metrics::record_reconnect(true);
                metrics::record_store_health(true);
                tracing::info!(attempts = attempt, "Backing store connection restored");
                true
            }
            Err(e) => {
                self.set_last_error(&e);
                metrics::record_reconnect(false);
                tracing::error!(attempt, error = %e, "Reconnect to backing store failed");
                false
            }
        }
    }

    async fn run<T, F, Fut>(&self, command: F) -> Result<T, StoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let conn = ConnectionManager::clone(&self.conn.load());
        let result = with_deadline(self.command_timeout, command(conn)).await;
        if let Err(e) = &result {
            self.note_error(e);
        }
        result
    }

    fn note_error(&self, err: &StoreError) {
        self.set_last_error(err);
        if needs_reconnect(err) && self.healthy.swap(false, Ordering::AcqRel) {
            metrics::record_store_health(false);
            tracing::warn!(error = %err, "Backing store connection marked unhealthy");
        }
    }

    fn set_last_error(&self, err: &StoreError) {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(err.to_string());
    }
}

async fn open_manager(
    client: &redis::Client,
    deadline: Duration,
) -> Result<ConnectionManager, StoreError> {
    with_deadline(deadline, client.get_connection_manager()).await
}

/// Strip credentials from a connection URL before logging it.
fn redacted(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<invalid url>".to_string(),
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(|mut conn| async move {
            match mode {
                None => conn.set(key, value).await,
                Some(SetMode::Ex(secs)) => conn.set_ex(key, value, secs).await,
                Some(SetMode::Px(ms)) => conn.pset_ex(key, value, ms).await,
            }
        })
        .await
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.incr(key, 1i64).await }).await
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.expire(key, ttl_secs).await }).await
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.ttl(key).await }).await
    }

    async fn exists(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.exists(key).await }).await
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.run(|mut conn| async move { conn.del(keys).await }).await
    }

    async fn ping(&self) -> Result<String, StoreError> {
        self.run(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await
    }

    fn connection_health(&self) -> ConnectionHealth {
        ConnectionHealth {
            healthy: self.is_healthy(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Acquire),
        }
    }

    async fn check_connection(&self) -> bool {
        if !self.is_healthy() {
            return self.reconnect().await;
        }
        match self.ping().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Backing store health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_reconnect_detection() {
        let read_only = RedisError::from((
            ErrorKind::ReadOnly,
            "You can't write against a read only replica.",
        ));
        assert!(needs_reconnect(&StoreError::Transport(read_only)));

        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(needs_reconnect(&StoreError::Transport(io)));
    }

    #[test]
    fn test_message_fallback() {
        let err = RedisError::from((
            ErrorKind::ResponseError,
            "server said",
            "READONLY replica".to_string(),
        ));
        assert!(needs_reconnect(&StoreError::Transport(err)));

        let err = RedisError::from((ErrorKind::TypeError, "wrong type"));
        assert!(!needs_reconnect(&StoreError::Transport(err)));
    }

    #[test]
    fn test_timeouts_do_not_force_reconnect() {
        assert!(!needs_reconnect(&StoreError::Timeout(Duration::from_secs(1))));
        assert!(!needs_reconnect(&StoreError::NotAnInteger("k".into())));
        assert!(needs_reconnect(&StoreError::Unavailable("gone".into())));
    }

    #[test]
    fn test_redacted_url() {
        assert_eq!(redacted("redis://:secret@cache:6379"), "redis://:***@cache:6379");
        assert_eq!(redacted("redis://cache:6379"), "redis://cache:6379");
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let config = StoreConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout_ms: 500,
            command_timeout_ms: 500,
        };
        let result = RedisBackend::connect(&config, ReconnectConfig::default()).await;
        assert!(result.is_err());
    }
}
