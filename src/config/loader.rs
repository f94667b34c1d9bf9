//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value `{value}` for environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServerConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("EDGE_HOST") {
        config.listener.host = v.trim().to_string();
    }
    if let Some(v) = get("PORT") {
        config.listener.port = parse_var("PORT", &v)?;
    }
    if let Some(v) = get("EDGE_RATE_LIMIT") {
        config.rate_limit.requests_per_second = parse_var("EDGE_RATE_LIMIT", &v)?;
    }
    if let Some(v) = get("EDGE_RATE_LIMIT_BURST") {
        config.rate_limit.burst = parse_var("EDGE_RATE_LIMIT_BURST", &v)?;
    }
    if let Some(v) = get("EDGE_MAX_REQUEST_BYTES") {
        config.limits.max_request_bytes = parse_var("EDGE_MAX_REQUEST_BYTES", &v)?;
    }
    if let Some(v) = get("EDGE_READ_TIMEOUT_SECS") {
        config.timeouts.read_secs = parse_var("EDGE_READ_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("EDGE_WRITE_TIMEOUT_SECS") {
        config.timeouts.write_secs = parse_var("EDGE_WRITE_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("EDGE_IDLE_TIMEOUT_SECS") {
        config.timeouts.idle_secs = parse_var("EDGE_IDLE_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("EDGE_SHUTDOWN_TIMEOUT_SECS") {
        config.timeouts.shutdown_grace_secs = parse_var("EDGE_SHUTDOWN_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("EDGE_TRUSTED_PROXIES") {
        config.security.trusted_proxies = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = get("EDGE_STATIC_DIR") {
        config.assets.static_dir = v;
    }
    if let Some(v) = get("EDGE_TEMPLATES_PATTERN") {
        config.assets.templates_pattern = v;
    }
    if let Some(v) = get("EDGE_LOG_LEVEL") {
        config.observability.log_level = v;
    }

    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut config = ServerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PORT", "9000"),
                ("EDGE_RATE_LIMIT", "2.5"),
                ("EDGE_RATE_LIMIT_BURST", "4"),
                ("EDGE_TRUSTED_PROXIES", "10.0.0.1, 192.168.0.0/16,"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.rate_limit.requests_per_second, 2.5);
        assert_eq!(config.rate_limit.burst, 4);
        assert_eq!(
            config.security.trusted_proxies,
            vec!["10.0.0.1".to_string(), "192.168.0.0/16".to_string()]
        );
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let mut config = ServerConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", "")])).unwrap();
        assert_eq!(config.listener.port, 8080);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = ServerConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("EDGE_RATE_LIMIT_BURST", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "EDGE_RATE_LIMIT_BURST", .. }));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [rate_limit]
            burst = 3

            [timeouts]
            shutdown_grace_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.burst, 3);
        assert_eq!(config.rate_limit.requests_per_second, 5.0);
        assert_eq!(config.timeouts.shutdown_grace_secs, 2);
        assert_eq!(config.timeouts.idle_secs, 120);
        assert_eq!(config.assets.templates_pattern, "templates/*");
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_request_bytes = 0").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("max_request_bytes"));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let example = include_str!("../../static-edge.example.toml");
        let config: ServerConfig = toml::from_str(example).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.listener.port, ServerConfig::default().listener.port);
        assert_eq!(config.rate_limit.burst, 10);
        assert_eq!(config.security.trusted_proxies, vec!["127.0.0.1".to_string()]);
    }
}
