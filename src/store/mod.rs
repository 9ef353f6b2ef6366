//! Key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! Caller (rate limiter, cache, session store)
//!     → resilient.rs (ResilientClient: degraded defaults, failure logging)
//!         → circuit breaker (resilience/)
//!             → redis_backend.rs (RedisBackend: real transport, connection health)
//!     or  → fallback.rs (FallbackStore: in-memory emulation)
//! ```
//!
//! # Design Decisions
//! - One operation surface (`KvBackend`) shared by the real and in-memory stores
//! - Values are strings on the wire, counters included
//! - Callers never see transport errors; they get per-operation defaults

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod fallback;
pub mod redis_backend;
pub mod resilient;

pub use fallback::FallbackStore;
pub use redis_backend::RedisBackend;
pub use resilient::{BackingMode, ClientOptions, HealthStatus, ResilientClient};

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] ::redis::RedisError),

    /// The command did not complete within its deadline.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// No usable connection.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Increment on a value that does not parse as a 64-bit integer.
    #[error("value at key '{0}' is not an integer or out of range")]
    NotAnInteger(String),

    /// Expiry too far in the future to represent.
    #[error("invalid expire time for key '{0}'")]
    InvalidExpiry(String),
}

impl StoreError {
    /// Stable label for the error class, independent of keys and messages.
    pub fn kind(&self) -> String {
        match self {
            StoreError::Transport(e) => format!("transport:{:?}", e.kind()),
            StoreError::Timeout(_) => "timeout".to_string(),
            StoreError::Unavailable(_) => "unavailable".to_string(),
            StoreError::NotAnInteger(_) => "not_an_integer".to_string(),
            StoreError::InvalidExpiry(_) => "invalid_expiry".to_string(),
        }
    }
}

/// Expiry option for `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Expire after this many seconds.
    Ex(u64),
    /// Expire after this many milliseconds.
    Px(u64),
}

impl SetMode {
    pub fn ttl(&self) -> Duration {
        match *self {
            SetMode::Ex(secs) => Duration::from_secs(secs),
            SetMode::Px(ms) => Duration::from_millis(ms),
        }
    }
}

/// Reply to a `set`. Always renders as `"OK"`; `Degraded` means nothing was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    Applied,
    Degraded,
}

impl WriteAck {
    pub fn as_str(&self) -> &'static str {
        "OK"
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, WriteAck::Degraded)
    }
}

/// Connection-level health flags of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub healthy: bool,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            last_error: None,
            reconnect_attempts: 0,
        }
    }
}

/// Operation surface of the backing key-value store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> Result<(), StoreError>;

    /// Add one to the integer at `key` (absent counts as 0) and return the new value.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// 1 if the key existed and now has the expiry, else 0.
    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<i64, StoreError>;

    /// -2 if absent, -1 if no expiry, else whole seconds remaining.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    async fn exists(&self, key: &str) -> Result<i64, StoreError>;

    /// Number of keys actually removed.
    async fn del(&self, keys: &[&str]) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<String, StoreError>;

    fn connection_health(&self) -> ConnectionHealth {
        ConnectionHealth::default()
    }

    /// Probe the connection, reconnecting if the backend supports it.
    async fn check_connection(&self) -> bool {
        self.ping().await.is_ok()
    }
}
