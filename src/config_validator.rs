use reqwest::Url;
use serde::Serialize;

use crate::config::Config;
use crate::error::ConfigError;
use crate::rate_limit_config::RateLimitRule;

/// Catalog API keys start with this prefix.
pub const API_KEY_PREFIX: &str = "AIza";
pub const API_KEY_LENGTH: usize = 39;

/// Answer of `GET /api/catalog/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyStatus {
    pub configured: bool,
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_api_enable: Option<bool>,
}

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the catalog base URL
    pub fn validate_catalog_url(url: &str) -> Result<(), ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "Catalog base URL cannot be empty".to_string(),
            ));
        }

        let parsed = Url::parse(url)
            .map_err(|e| ConfigError::Invalid(format!("Catalog base URL '{}' is invalid: {}", url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "Catalog base URL must start with 'http://' or 'https://'".to_string(),
            ));
        }

        if parsed.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "Catalog base URL '{}' cannot carry a path",
                url
            )));
        }

        Ok(())
    }

    /// Validates a bind address
    pub fn validate_bind_address(address: &str) -> Result<(), ConfigError> {
        if address.is_empty() {
            return Err(ConfigError::Invalid(
                "Bind address cannot be empty".to_string(),
            ));
        }

        // Check if it looks like host:port format
        if !address.contains(':') {
            return Err(ConfigError::Invalid(
                "Bind address must be in host:port format".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(name: &str, rule: &RateLimitRule) -> Result<(), ConfigError> {
        rule.validate()
            .map_err(|e| ConfigError::Invalid(format!("Rate limit '{}': {}", name, e)))
    }

    /// Validates a cache capacity
    pub fn validate_cache_size(name: &str, size: usize) -> Result<(), ConfigError> {
        if size == 0 {
            return Err(ConfigError::Invalid(format!(
                "Cache '{}' size must be greater than 0",
                name
            )));
        }

        Ok(())
    }

    /// Format check only; says nothing about whether the key is enabled.
    pub fn validate_api_key(key: &str) -> bool {
        key.starts_with(API_KEY_PREFIX) && key.len() == API_KEY_LENGTH
    }

    pub fn api_key_status(raw_key: Option<&str>, use_key: bool) -> ApiKeyStatus {
        let key = match raw_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => {
                return ApiKeyStatus {
                    configured: false,
                    valid: false,
                    message: "Catalog API key not configured. Using limited rate limits."
                        .to_string(),
                    needs_api_enable: None,
                }
            }
        };

        if !Self::validate_api_key(key) {
            return ApiKeyStatus {
                configured: true,
                valid: false,
                message: "Catalog API key format appears invalid. Please check your key."
                    .to_string(),
                needs_api_enable: None,
            };
        }

        if !use_key {
            return ApiKeyStatus {
                configured: true,
                valid: true,
                message: "API key available but not enabled for the catalog API. Using without key."
                    .to_string(),
                needs_api_enable: Some(true),
            };
        }

        ApiKeyStatus {
            configured: true,
            valid: true,
            message: "Catalog API key configured and valid.".to_string(),
            needs_api_enable: None,
        }
    }

    /// Validates a complete service configuration
    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        Self::validate_catalog_url(&config.catalog_base_url)?;
        Self::validate_bind_address(&config.bind_addr.to_string())?;

        let limits = config.rate_limit_config();
        Self::validate_rate_limit("api", &limits.api)?;
        Self::validate_rate_limit("search", &limits.search)?;
        Self::validate_rate_limit("auth", &limits.auth)?;

        let caches = config.cache_settings();
        Self::validate_cache_size("search", caches.search)?;
        Self::validate_cache_size("books", caches.books)?;
        Self::validate_cache_size("trending", caches.trending)?;
        Self::validate_cache_size("dashboard", caches.dashboard)?;

        if config.catalog_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "Catalog max attempts must be greater than 0".to_string(),
            ));
        }

        if config.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "Cleanup interval must be greater than 0".to_string(),
            ));
        }

        config.trusted_proxy_list()?;

        if config.trending_query_list().is_empty() {
            return Err(ConfigError::Invalid(
                "At least one trending query is required".to_string(),
            ));
        }

        Ok(())
    }
}
