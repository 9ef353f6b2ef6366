//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the single `ResilientClient` for the process from configuration
//! - Fall back to the in-memory store when the real store is disabled or
//!   unreachable at startup
//!
//! The client is returned to the caller and passed down explicitly; nothing
//! here is stored in a global.

use std::sync::Arc;

use crate::config::GuardConfig;
use crate::store::{ClientOptions, KvBackend, RedisBackend, ResilientClient};

/// Client options derived from configuration.
pub fn client_options(config: &GuardConfig) -> ClientOptions {
    ClientOptions {
        breaker: config.breaker.clone(),
        backing_service_enabled: config.store.enabled,
        failure_log_every: config.observability.failure_log_every,
        ..ClientOptions::default()
    }
}

/// Connect to the configured store and wrap it.
pub async fn build_client(config: &GuardConfig) -> ResilientClient {
    build_client_with(config, client_options(config)).await
}

/// As [`build_client`], with caller-supplied options (e.g. a custom classifier).
pub async fn build_client_with(config: &GuardConfig, options: ClientOptions) -> ResilientClient {
    if !config.store.enabled {
        tracing::warn!("Backing store disabled by configuration; using in-memory store");
        return ResilientClient::in_memory(options);
    }

    match RedisBackend::connect(&config.store, config.reconnect.clone()).await {
        Ok(backend) => ResilientClient::new(Some(Arc::new(backend) as Arc<dyn KvBackend>), options),
        Err(e) => {
            tracing::error!(
                error = %e,
                "Backing store unreachable at startup; using in-memory store"
            );
            ResilientClient::in_memory(options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BackingMode;

    #[tokio::test]
    async fn test_disabled_store_uses_memory() {
        let mut config = GuardConfig::default();
        config.store.enabled = false;

        let client = build_client(&config).await;
        assert_eq!(client.mode(), BackingMode::InMemory);
        assert_eq!(client.increment("visits").await, 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_uses_memory() {
        let mut config = GuardConfig::default();
        config.store.url = "redis://127.0.0.1:1".to_string();
        config.store.connect_timeout_ms = 300;

        let client = build_client(&config).await;
        assert_eq!(client.mode(), BackingMode::InMemory);
    }

    #[test]
    fn test_options_follow_config() {
        let mut config = GuardConfig::default();
        config.breaker.failure_threshold = 9;
        config.observability.failure_log_every = 4;

        let options = client_options(&config);
        assert_eq!(options.breaker.failure_threshold, 9);
        assert_eq!(options.failure_log_every, 4);
        assert!(options.backing_service_enabled);
    }
}
