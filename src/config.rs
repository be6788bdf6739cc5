//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::{CachePolicy, TimeUnit};
use crate::error::Result;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Seconds after a write before an entry expires (0 = never)
    pub expire_after_write: i64,
    /// Seconds after the last access before an entry expires (0 = never)
    pub expire_after_access: i64,
    /// Seconds after a write before an entry is refreshed in the background (0 = never)
    pub refresh_after_write: i64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Base URL values are fetched from on a miss
    pub origin_url: String,
    /// Prefix for this server's keys in the backing store
    pub namespace: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `EXPIRE_AFTER_WRITE` - Write expiry in seconds (default: 300)
    /// - `EXPIRE_AFTER_ACCESS` - Access expiry in seconds (default: 0)
    /// - `REFRESH_AFTER_WRITE` - Refresh interval in seconds (default: 60)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 30)
    /// - `ORIGIN_URL` - Origin base URL (default: http://127.0.0.1:8080)
    /// - `CACHE_NAMESPACE` - Key namespace (default: stampede)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            expire_after_write: parse_env("EXPIRE_AFTER_WRITE")
                .unwrap_or(defaults.expire_after_write),
            expire_after_access: parse_env("EXPIRE_AFTER_ACCESS")
                .unwrap_or(defaults.expire_after_access),
            refresh_after_write: parse_env("REFRESH_AFTER_WRITE")
                .unwrap_or(defaults.refresh_after_write),
            cleanup_interval: parse_env("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
        }
    }

    /// Builds the cache policy. Fails on negative durations.
    pub fn policy(&self) -> Result<CachePolicy> {
        Ok(CachePolicy::builder()
            .expire_after_write(self.expire_after_write, TimeUnit::Seconds)?
            .expire_after_access(self.expire_after_access, TimeUnit::Seconds)?
            .refresh_after_write(self.refresh_after_write, TimeUnit::Seconds)?
            .build())
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            expire_after_write: 300,
            expire_after_access: 0,
            refresh_after_write: 60,
            cleanup_interval: 30,
            origin_url: "http://127.0.0.1:8080".to_string(),
            namespace: "stampede".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::time::Duration;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.expire_after_write, 300);
        assert_eq!(config.expire_after_access, 0);
        assert_eq!(config.refresh_after_write, 60);
        assert_eq!(config.cleanup_interval, 30);
        assert_eq!(config.namespace, "stampede");
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("SERVER_PORT");
        env::remove_var("EXPIRE_AFTER_WRITE");
        env::remove_var("REFRESH_AFTER_WRITE");
        env::remove_var("ORIGIN_URL");

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.expire_after_write, 300);
        assert_eq!(config.refresh_after_write, 60);
        assert_eq!(config.origin_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_policy_from_config() {
        let policy = Config::default().policy().unwrap();
        assert_eq!(policy.expire_after_write(), Duration::from_secs(300));
        assert_eq!(policy.refresh_after_write(), Duration::from_secs(60));
        assert!(!policy.records_access());
    }

    #[test]
    fn test_negative_policy_rejected() {
        let config = Config {
            refresh_after_write: -1,
            ..Config::default()
        };
        assert!(matches!(
            config.policy(),
            Err(CacheError::InvalidArgument(_))
        ));
    }
}
