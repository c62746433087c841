//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject zero-valued limits that would deadlock admission
//! - Detect duplicate or empty service overrides
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the deserialized config
//! - Runs before the config is accepted into a client

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{ClientConfig, PoolLimits};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{scope}: `max_pending_connections` must be at least 1")]
    PendingConnectionsZero { scope: String },

    #[error("{scope}: `max_concurrent_http1_connections` must be at least 1 when set")]
    Http1CapZero { scope: String },

    #[error("{scope}: `max_concurrent_http2_connections` must be at least 1")]
    Http2CapZero { scope: String },

    #[error(
        "{scope}: `max_concurrent_requests_per_http2_connection` is required and must be at least 1"
    )]
    StreamsPerConnectionUnset { scope: String },

    #[error("{scope}: `max_pending_acquires` must be at least 1 when set")]
    PendingAcquiresZero { scope: String },

    #[error("duplicate service override `{name}`")]
    DuplicateService { name: String },

    #[error("service override with empty name")]
    EmptyServiceName,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_limits(&config.pool, "pool", &mut errors);

    let mut seen: HashSet<&str> = HashSet::new();
    for svc in &config.services {
        if svc.name.is_empty() {
            errors.push(ValidationError::EmptyServiceName);
            continue;
        }
        if !seen.insert(svc.name.as_str()) {
            errors.push(ValidationError::DuplicateService {
                name: svc.name.clone(),
            });
            continue;
        }
        // Validate what the service actually runs with, not the raw override.
        let effective = config.limits_for(&svc.name);
        check_limits(&effective, &format!("services.{}", svc.name), &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_limits(limits: &PoolLimits, scope: &str, errors: &mut Vec<ValidationError>) {
    if limits.max_pending_connections == 0 {
        errors.push(ValidationError::PendingConnectionsZero {
            scope: scope.to_string(),
        });
    }
    if limits.max_concurrent_http1_connections == Some(0) {
        errors.push(ValidationError::Http1CapZero {
            scope: scope.to_string(),
        });
    }
    if limits.max_concurrent_http2_connections == 0 {
        errors.push(ValidationError::Http2CapZero {
            scope: scope.to_string(),
        });
    }
    if limits.max_concurrent_requests_per_http2_connection == 0 {
        errors.push(ValidationError::StreamsPerConnectionUnset {
            scope: scope.to_string(),
        });
    }
    if limits.max_pending_acquires == Some(0) {
        errors.push(ValidationError::PendingAcquiresZero {
            scope: scope.to_string(),
        });
    }
}

/// Join validation errors into one readable line.
pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PoolOverrides, ServiceConfig};

    fn valid_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.pool.max_concurrent_requests_per_http2_connection = 100;
        config
    }

    #[test]
    fn test_default_config_requires_stream_cap() {
        // The stream cap has no hidden default; an untouched config is invalid.
        let errors = validate_config(&ClientConfig::default()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::StreamsPerConnectionUnset { .. })));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.pool.max_pending_connections = 0;
        config.pool.max_concurrent_http2_connections = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let mut config = valid_config();
        for _ in 0..2 {
            config.services.push(ServiceConfig {
                name: "search".into(),
                overrides: PoolOverrides::default(),
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateService { name } if name == "search")));
    }

    #[test]
    fn test_zero_override_rejected() {
        let mut config = valid_config();
        config.services.push(ServiceConfig {
            name: "billing".into(),
            overrides: PoolOverrides {
                max_pending_connections: Some(0),
                ..Default::default()
            },
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::PendingConnectionsZero {
                scope: "services.billing".into()
            }]
        );
    }
}
