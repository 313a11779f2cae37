//! Server configuration from environment variables.
//!
//! Every key is optional; unset keys fall back to the defaults below and
//! command-line flags may override the result afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use uboard_core::clock::{HOUR_MS, MINUTE_MS};
use uboard_core::{default_log_level, AuthPolicy};

pub const ENV_BIND: &str = "UBOARD_BIND";
pub const ENV_DB_PATH: &str = "UBOARD_DB_PATH";
pub const ENV_PUBLIC_URL: &str = "UBOARD_PUBLIC_URL";
pub const ENV_EMAIL_DOMAINS: &str = "UBOARD_EMAIL_DOMAINS";
pub const ENV_LOG_LEVEL: &str = "UBOARD_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "UBOARD_LOG_DIR";
pub const ENV_CORS_ORIGINS: &str = "UBOARD_CORS_ORIGINS";
pub const ENV_MAX_FAILED_LOGINS: &str = "UBOARD_MAX_FAILED_LOGINS";
pub const ENV_LOCKOUT_MINUTES: &str = "UBOARD_LOCKOUT_MINUTES";
pub const ENV_SESSION_TTL_HOURS: &str = "UBOARD_SESSION_TTL_HOURS";

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DB_PATH: &str = "uboard.sqlite3";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub log_level: String,
    /// Absolute directory for rotated log files; stderr when unset.
    pub log_dir: Option<String>,
    /// Allowed browser origins; `*` allows any, empty disables CORS.
    pub cors_origins: Vec<String>,
    pub policy: AuthPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: default_log_level().to_string(),
            log_dir: None,
            cors_origins: Vec::new(),
            policy: AuthPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        let bind = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        config.bind = bind
            .parse()
            .map_err(|err| ConfigError::invalid(ENV_BIND, &bind, format!("{err}")))?;

        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = get(ENV_PUBLIC_URL) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    ENV_PUBLIC_URL,
                    &url,
                    "must start with http:// or https://",
                ));
            }
            config.policy.public_url = url.trim_end_matches('/').to_string();
        }
        if let Some(domains) = get(ENV_EMAIL_DOMAINS) {
            config.policy.allowed_email_domains = split_list(&domains)
                .into_iter()
                .map(|domain| domain.trim_start_matches('@').to_ascii_lowercase())
                .collect();
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = get(ENV_LOG_DIR);
        if let Some(origins) = get(ENV_CORS_ORIGINS) {
            config.cors_origins = split_list(&origins);
        }
        if let Some(value) = get(ENV_MAX_FAILED_LOGINS) {
            config.policy.max_failed_logins = parse_positive(ENV_MAX_FAILED_LOGINS, &value)?;
        }
        if let Some(value) = get(ENV_LOCKOUT_MINUTES) {
            let minutes = parse_positive(ENV_LOCKOUT_MINUTES, &value)?;
            config.policy.lockout_ms = i64::from(minutes) * MINUTE_MS;
        }
        if let Some(value) = get(ENV_SESSION_TTL_HOURS) {
            let hours = parse_positive(ENV_SESSION_TTL_HOURS, &value)?;
            config.policy.session_ttl_ms = i64::from(hours) * HOUR_MS;
        }

        Ok(config)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(0) => Err(ConfigError::invalid(key, value, "must be greater than zero")),
        Ok(parsed) => Ok(parsed),
        Err(err) => Err(ConfigError::invalid(key, value, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.policy, AuthPolicy::default());
        assert!(config.cors_origins.is_empty());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn values_are_parsed_and_normalized() {
        let config = config_from(&[
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_PUBLIC_URL, "https://uboard.example/"),
            (ENV_EMAIL_DOMAINS, "@UToronto.ca, mail.utoronto.ca ,"),
            (ENV_CORS_ORIGINS, "https://a.example,https://b.example"),
            (ENV_LOCKOUT_MINUTES, "30"),
            (ENV_SESSION_TTL_HOURS, "2"),
            (ENV_LOG_DIR, "  "),
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.policy.public_url, "https://uboard.example");
        assert_eq!(
            config.policy.allowed_email_domains,
            vec!["utoronto.ca".to_string(), "mail.utoronto.ca".to_string()]
        );
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.policy.lockout_ms, 30 * MINUTE_MS);
        assert_eq!(config.policy.session_ttl_ms, 2 * HOUR_MS);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn invalid_values_name_their_key() {
        let err = config_from(&[(ENV_BIND, "not-an-address")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_BIND, .. }));

        let err = config_from(&[(ENV_MAX_FAILED_LOGINS, "0")]).unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_FAILED_LOGINS));

        let err = config_from(&[(ENV_PUBLIC_URL, "uboard.example")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_PUBLIC_URL, .. }));
    }
}
