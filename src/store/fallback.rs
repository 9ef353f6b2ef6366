//! In-memory stand-in for the backing store.
//!
//! Used when the store is disabled by configuration or unreachable at startup.
//! Expired keys are purged lazily when that key is next touched; there is no
//! background sweep. Nothing is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::{KvBackend, SetMode, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Thread-safe in-memory key-value store with per-key expiry.
#[derive(Debug, Clone, Default)]
pub struct FallbackStore {
    entries: Arc<DashMap<String, Entry>>,
    announced: Arc<AtomicBool>,
}

impl FallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.announce();
        self.purge_if_expired(key);
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Store `value`, replacing any previous value and expiry.
    ///
    /// Fails without touching the key when the expiry cannot be represented.
    pub fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> Result<(), StoreError> {
        self.announce();
        let expires_at = mode.map(|m| expiry_after(key, m.ttl())).transpose()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    /// Increment the integer at `key`; an absent key counts as 0. Expiry is kept.
    pub fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.announce();
        self.purge_if_expired(key);

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let next = entry
            .value
            .parse::<i64>()
            .ok()
            .and_then(|current| current.checked_add(1))
            .ok_or_else(|| StoreError::NotAnInteger(key.to_string()))?;
        entry.value = next.to_string();
        Ok(next)
    }

    /// Set or overwrite the expiry of an existing key. A non-positive TTL deletes it.
    pub fn expire(&self, key: &str, ttl_secs: i64) -> Result<i64, StoreError> {
        self.announce();
        self.purge_if_expired(key);

        if ttl_secs <= 0 {
            return Ok(self.entries.remove(key).map_or(0, |_| 1));
        }

        let expires_at = expiry_after(key, Duration::from_secs(ttl_secs.unsigned_abs()))?;
        Ok(match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(expires_at);
                1
            }
            None => 0,
        })
    }

    pub fn ttl(&self, key: &str) -> i64 {
        self.announce();
        self.purge_if_expired(key);

        let Some(entry) = self.entries.get(key) else {
            return -2;
        };
        match entry.expires_at {
            None => -1,
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                remaining.as_millis().div_ceil(1000) as i64
            }
        }
    }

    pub fn exists(&self, key: &str) -> i64 {
        self.announce();
        self.purge_if_expired(key);
        i64::from(self.entries.contains_key(key))
    }

    pub fn del(&self, keys: &[&str]) -> i64 {
        self.announce();
        let now = Instant::now();
        keys.iter()
            .filter_map(|key| self.entries.remove(*key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count() as i64
    }

    pub fn ping(&self) -> &'static str {
        "PONG"
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn announce(&self) {
        if !self.announced.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Backing store unavailable; serving from in-process memory \
                 (not shared, not persisted)"
            );
        }
    }
}

/// Absolute deadline `ttl` from now, or an error when it overflows the clock.
fn expiry_after(key: &str, ttl: Duration) -> Result<Instant, StoreError> {
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| StoreError::InvalidExpiry(key.to_string()))
}

#[async_trait]
impl KvBackend for FallbackStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(FallbackStore::get(self, key))
    }

    async fn set(&self, key: &str, value: &str, mode: Option<SetMode>) -> Result<(), StoreError> {
        FallbackStore::set(self, key, value, mode)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        FallbackStore::increment(self, key)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<i64, StoreError> {
        FallbackStore::expire(self, key, ttl_secs)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        Ok(FallbackStore::ttl(self, key))
    }

    async fn exists(&self, key: &str) -> Result<i64, StoreError> {
        Ok(FallbackStore::exists(self, key))
    }

    async fn del(&self, keys: &[&str]) -> Result<i64, StoreError> {
        Ok(FallbackStore::del(self, keys))
    }

    async fn ping(&self) -> Result<String, StoreError> {
        Ok(FallbackStore::ping(self).to_string())
    }
}
