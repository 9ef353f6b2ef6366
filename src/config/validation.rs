//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0)
//! - Validate addresses and the store URL scheme
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GuardConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("store.url '{url}' is invalid: {reason}")]
    InvalidStoreUrl { url: String, reason: String },

    #[error("{field} '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("reconnect.base_delay_ms ({base}) exceeds reconnect.max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positives: [(&'static str, u64); 6] = [
        ("breaker.failure_threshold", config.breaker.failure_threshold as u64),
        ("breaker.half_open_success_threshold", config.breaker.half_open_success_threshold as u64),
        ("breaker.reset_timeout_ms", config.breaker.reset_timeout_ms),
        ("store.command_timeout_ms", config.store.command_timeout_ms),
        ("store.connect_timeout_ms", config.store.connect_timeout_ms),
        ("observability.failure_log_every", config.observability.failure_log_every),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "health_check.interval_secs" });
    }

    if config.reconnect.base_delay_ms > config.reconnect.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: config.reconnect.base_delay_ms,
            max: config.reconnect.max_delay_ms,
        });
    }

    if config.store.enabled {
        match url::Url::parse(&config.store.url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
            Ok(url) => errors.push(ValidationError::InvalidStoreUrl {
                url: config.store.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidStoreUrl {
                url: config.store.url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GuardConfig::default();
        config.breaker.failure_threshold = 0;
        config.breaker.half_open_success_threshold = 0;
        config.store.url = "http://localhost:6379".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "breaker.failure_threshold"
        }));
        assert!(matches!(errors[2], ValidationError::InvalidStoreUrl { .. }));
    }

    #[test]
    fn test_store_url_ignored_when_disabled() {
        let mut config = GuardConfig::default();
        config.store.enabled = false;
        config.store.url = "not a url".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_admin_address_checked_when_enabled() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        config.admin.bind_address = "localhost".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("admin.bind_address"));
    }
}
