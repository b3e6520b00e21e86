//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, request timeout > 0, breaker cooldown)
//! - Reject hosts that cannot be bound
//! - Check upstream names are unique and URLs usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;

/// Lowest port accepted for the listener.
pub const MIN_PORT: u16 = 80;

/// Longest breaker cooldown accepted, one day.
pub const MAX_COOLDOWN_SECS: u64 = 86_400;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must be between 80 and 65535, got {0}")]
    PortOutOfRange(u16),

    #[error("listener.host must not be empty")]
    EmptyHost,

    #[error("listener.host '{0}' is not a valid host name or address")]
    InvalidHost(String),

    #[error("breaker.cooldown_secs must be at most 86400, got {0}")]
    CooldownTooLong(u64),

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("upstream name must not be empty")]
    EmptyUpstreamName,

    #[error("upstream '{0}' is defined more than once")]
    DuplicateUpstream(String),

    #[error("upstream '{name}' has invalid url '{url}': {reason}")]
    InvalidUpstreamUrl {
        name: String,
        url: String,
        reason: String,
    },
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port < MIN_PORT {
        errors.push(ValidationError::PortOutOfRange(config.listener.port));
    }
    let host = &config.listener.host;
    if host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    } else if !is_bindable_host(host) {
        errors.push(ValidationError::InvalidHost(host.clone()));
    }
    if config.breaker.cooldown_secs > MAX_COOLDOWN_SECS {
        errors.push(ValidationError::CooldownTooLong(config.breaker.cooldown_secs));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let mut seen = HashSet::new();
    for upstream in &config.upstreams {
        if upstream.name.is_empty() {
            errors.push(ValidationError::EmptyUpstreamName);
        } else if !seen.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.name.clone()));
        }

        if let Err(reason) = check_upstream_url(&upstream.url) {
            errors.push(ValidationError::InvalidUpstreamUrl {
                name: upstream.name.clone(),
                url: upstream.url.clone(),
                reason,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Host names and IP literals only; whitespace and paths are rejected.
fn is_bindable_host(host: &str) -> bool {
    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}

fn check_upstream_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UpstreamConfig;

    fn upstream(name: &str, url: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.listener.port = 79;
        config.listener.host = " ".to_string();
        config.breaker.cooldown_secs = u64::MAX;
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::PortOutOfRange(79),
                ValidationError::EmptyHost,
                ValidationError::CooldownTooLong(u64::MAX),
                ValidationError::ZeroRequestTimeout,
            ]
        );
    }

    #[test]
    fn test_breaker_zero_values_are_accepted() {
        let mut config = ServiceConfig::default();
        config.breaker.failure_threshold = 0;
        config.breaker.cooldown_secs = 0;
        config.breaker.timeout_secs = 0;
        assert!(validate_config(&config).is_ok());

        config.breaker.cooldown_secs = MAX_COOLDOWN_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_host_shapes() {
        let mut config = ServiceConfig::default();
        for host in ["0.0.0.0", "localhost", "api.example-1.internal", "::1", "[::]"] {
            config.listener.host = host.to_string();
            assert!(validate_config(&config).is_ok(), "{} rejected", host);
        }
        for host in ["my host", "example.com/path", "http://example.com", "bad\thost"] {
            config.listener.host = host.to_string();
            assert_eq!(
                validate_config(&config).unwrap_err(),
                vec![ValidationError::InvalidHost(host.to_string())]
            );
        }
    }

    #[test]
    fn test_port_bounds() {
        let mut config = ServiceConfig::default();
        config.listener.port = 65535;
        assert!(validate_config(&config).is_ok());
        config.listener.port = 80;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_upstreams() {
        let mut config = ServiceConfig::default();
        config.upstreams = vec![
            upstream("users", "http://users/api"),
            upstream("users", "https://users-2/api"),
            upstream("", "http://x"),
            upstream("ftp", "ftp://files"),
            upstream("relative", "/just/a/path"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0], ValidationError::DuplicateUpstream("users".into()));
        assert_eq!(errors[1], ValidationError::EmptyUpstreamName);
        assert!(errors[2].to_string().contains("unsupported scheme 'ftp'"));
        assert!(errors[3].to_string().starts_with("upstream 'relative' has invalid url"));
    }
}
