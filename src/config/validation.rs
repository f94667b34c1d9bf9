//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, burst >= 1)
//! - Check that addresses, proxy entries and header values parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::security::client_ip::ProxyRule;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.host `{0}` is not an IP address")]
    InvalidHost(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("rate_limit.burst must be at least 1")]
    ZeroBurst,

    #[error("rate_limit.requests_per_second must be a finite, non-negative number (got {0})")]
    InvalidRate(f64),

    #[error("limits.max_request_bytes must be greater than zero")]
    ZeroRequestLimit,

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("security.trusted_proxies entry `{0}` is not an IP address or CIDR block")]
    InvalidTrustedProxy(String),

    #[error("security.content_security_policy is not a valid header value")]
    InvalidContentSecurityPolicy,

    #[error("assets.templates_pattern must not be empty")]
    EmptyTemplatesPattern,

    #[error("observability.log_format `{0}` is not one of: pretty, json")]
    InvalidLogFormat(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidHost(config.listener.host.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let rate = config.rate_limit.requests_per_second;
    if !rate.is_finite() || rate < 0.0 {
        errors.push(ValidationError::InvalidRate(rate));
    }
    if config.rate_limit.burst == 0 {
        errors.push(ValidationError::ZeroBurst);
    }

    if config.limits.max_request_bytes == 0 {
        errors.push(ValidationError::ZeroRequestLimit);
    }

    let timeouts = [
        ("read_secs", config.timeouts.read_secs),
        ("write_secs", config.timeouts.write_secs),
        ("idle_secs", config.timeouts.idle_secs),
        ("shutdown_grace_secs", config.timeouts.shutdown_grace_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    for entry in &config.security.trusted_proxies {
        if entry.parse::<ProxyRule>().is_err() {
            errors.push(ValidationError::InvalidTrustedProxy(entry.clone()));
        }
    }
    if HeaderValue::from_str(&config.security.content_security_policy).is_err() {
        errors.push(ValidationError::InvalidContentSecurityPolicy);
    }

    if config.assets.templates_pattern.trim().is_empty() {
        errors.push(ValidationError::EmptyTemplatesPattern);
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::InvalidLogFormat(other.to_string())),
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
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServerConfig::default();
        config.rate_limit.burst = 0;
        config.rate_limit.requests_per_second = f64::NAN;
        config.timeouts.idle_secs = 0;
        config.security.trusted_proxies.push("not-an-ip".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroBurst));
        assert!(errors.contains(&ValidationError::ZeroTimeout("idle_secs")));
        assert!(errors.contains(&ValidationError::InvalidTrustedProxy("not-an-ip".into())));
    }

    #[test]
    fn test_zero_rate_is_allowed() {
        let mut config = ServerConfig::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_cidr_proxies_accepted() {
        let mut config = ServerConfig::default();
        config.security.trusted_proxies = vec!["10.0.0.0/8".into(), "::1".into()];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = ServerConfig::default();
        config.observability.log_format = "xml".into();
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidLogFormat("xml".into())])
        );
    }
}
