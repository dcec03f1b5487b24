// Configuration for the catalog client and its response cache
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub hotels_path: String,
    pub countries_path: String,
    pub rooms_path: String,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
    pub cache_config: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            hotels_path: "/hotels/".to_string(),
            countries_path: "/payes/".to_string(),
            rooms_path: "/chambres/".to_string(),
            timeout_ms: 10_000,
            retry_config: RetryConfig::default(),
            cache_config: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `CATALOG_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(base_url) = var("CATALOG_API_URL") {
            config.base_url = base_url;
        }
        config.timeout_ms = try_load("CATALOG_TIMEOUT_MS", config.timeout_ms)?;
        config.retry_config.max_retries =
            try_load("CATALOG_MAX_RETRIES", config.retry_config.max_retries)?;
        config.cache_config.default_ttl_seconds = try_load(
            "CATALOG_CACHE_TTL_SECONDS",
            config.cache_config.default_ttl_seconds,
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::ConfigError(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_config.backoff_multiplier < 1.0 {
            return Err(ClientError::ConfigError(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size_mb: usize,
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 16,
            max_entries: 64,
            default_ttl_seconds: 60,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvictionPolicy {
    LeastRecentlyUsed,
    LeastFrequentlyUsed,
    OldestFirst,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T>(key: &str, default: T) -> Result<T, ClientError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            ClientError::ConfigError(format!("invalid {key} value {raw:?}: {e}"))
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.url(&config.hotels_path), "http://localhost:8000/hotels/");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = ClientConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url("/payes/"), "https://api.example.com/v1/payes/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig {
            base_url: "localhost:8000".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::ConfigError(_))));

        let config = ClientConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.retry_config.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        // Only this test touches CATALOG_* variables
        env::set_var("CATALOG_API_URL", "http://catalog.internal:9000");
        env::set_var("CATALOG_MAX_RETRIES", "5");
        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.base_url, "http://catalog.internal:9000");
        assert_eq!(config.retry_config.max_retries, 5);

        env::set_var("CATALOG_TIMEOUT_MS", "soon");
        assert!(matches!(
            ClientConfig::from_env(),
            Err(ClientError::ConfigError(_))
        ));

        env::remove_var("CATALOG_API_URL");
        env::remove_var("CATALOG_MAX_RETRIES");
        env::remove_var("CATALOG_TIMEOUT_MS");
    }
}
