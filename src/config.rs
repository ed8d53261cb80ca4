use envconfig::Envconfig;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::cache::TtlCache;
use crate::catalog::{CatalogCaches, CatalogSettings};
use crate::dashboard::DashboardPayload;
use crate::error::ConfigError;
use crate::rate_limit_config::{RateLimitConfig, RateLimitRule};
use crate::retry::RetryPolicy;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "CATALOG_BASE_URL", default = "https://www.googleapis.com/books/v1")]
    pub catalog_base_url: String,

    #[envconfig(from = "CATALOG_API_KEY")]
    pub catalog_api_key: Option<String>,

    /// The key is only sent once the Books API is enabled for it.
    #[envconfig(from = "CATALOG_USE_API_KEY", default = "false")]
    pub catalog_use_api_key: bool,

    /// Sent as `Referer` on catalog calls.
    #[envconfig(from = "SITE_URL", default = "http://localhost:3000")]
    pub site_url: String,

    /// Minimum spacing between outbound catalog calls
    #[envconfig(from = "CATALOG_MIN_DELAY_MS", default = "400")]
    pub catalog_min_delay_ms: u64,

    #[envconfig(from = "CATALOG_TIMEOUT_SECS", default = "15")]
    pub catalog_timeout_secs: u64,

    #[envconfig(from = "CATALOG_MAX_ATTEMPTS", default = "3")]
    pub catalog_max_attempts: u32,

    #[envconfig(from = "CATALOG_RETRY_BASE_MS", default = "1000")]
    pub catalog_retry_base_ms: u64,

    #[envconfig(from = "CATALOG_RETRY_MAX_MS", default = "5000")]
    pub catalog_retry_max_ms: u64,

    /// Comma-separated curated queries
    #[envconfig(
        from = "TRENDING_QUERIES",
        default = "subject:fiction bestseller,subject:biography popular,subject:science new"
    )]
    pub trending_queries: String,

    #[envconfig(from = "TRENDING_FALLBACK_QUERY", default = "popular books")]
    pub trending_fallback_query: String,

    #[envconfig(from = "TRENDING_QUERY_DELAY_MS", default = "500")]
    pub trending_query_delay_ms: u64,

    /// Overall bound on `GET /api/books/trending`
    #[envconfig(from = "TRENDING_REQUEST_TIMEOUT_SECS", default = "30")]
    pub trending_request_timeout_secs: u64,

    #[envconfig(from = "SEARCH_CACHE_SIZE", default = "500")]
    pub search_cache_size: usize,

    #[envconfig(from = "SEARCH_CACHE_TTL_SECS", default = "1800")]
    pub search_cache_ttl_secs: u64,

    #[envconfig(from = "BOOK_CACHE_SIZE", default = "500")]
    pub book_cache_size: usize,

    #[envconfig(from = "BOOK_CACHE_TTL_SECS", default = "3600")]
    pub book_cache_ttl_secs: u64,

    #[envconfig(from = "TRENDING_CACHE_SIZE", default = "50")]
    pub trending_cache_size: usize,

    #[envconfig(from = "TRENDING_CACHE_TTL_SECS", default = "7200")]
    pub trending_cache_ttl_secs: u64,

    #[envconfig(from = "DASHBOARD_CACHE_SIZE", default = "100")]
    pub dashboard_cache_size: usize,

    #[envconfig(from = "API_RATE_LIMIT", default = "100")]
    pub api_rate_limit: u32,

    #[envconfig(from = "API_RATE_WINDOW_SECS", default = "60")]
    pub api_rate_window_secs: u64,

    #[envconfig(from = "SEARCH_RATE_LIMIT", default = "30")]
    pub search_rate_limit: u32,

    #[envconfig(from = "SEARCH_RATE_WINDOW_SECS", default = "60")]
    pub search_rate_window_secs: u64,

    #[envconfig(from = "AUTH_RATE_LIMIT", default = "5")]
    pub auth_rate_limit: u32,

    #[envconfig(from = "AUTH_RATE_WINDOW_SECS", default = "900")]
    pub auth_rate_window_secs: u64,

    /// Cache and rate limiter cleanup interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    /// Header carrying the gateway-authenticated user id
    #[envconfig(from = "AUTH_USER_HEADER", default = "x-authenticated-user")]
    pub auth_user_header: String,

    /// Comma-separated proxy addresses whose forwarding headers are believed
    #[envconfig(from = "TRUSTED_PROXIES", default = "")]
    pub trusted_proxies: String,
}

/// Capacities for every cache domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub search: usize,
    pub books: usize,
    pub trending: usize,
    pub dashboard: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::init_from_env().map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// The key to send, if one is configured and enabled.
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.catalog_use_api_key {
            return None;
        }
        self.catalog_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    pub fn trending_query_list(&self) -> Vec<String> {
        self.trending_queries
            .split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            base_url: self.catalog_base_url.clone(),
            api_key: self.effective_api_key(),
            site_url: self.site_url.clone(),
            min_delay: Duration::from_millis(self.catalog_min_delay_ms),
            retry: RetryPolicy {
                max_attempts: self.catalog_max_attempts,
                base_delay: Duration::from_millis(self.catalog_retry_base_ms),
                max_delay: Duration::from_millis(self.catalog_retry_max_ms),
                attempt_timeout: Duration::from_secs(self.catalog_timeout_secs),
            },
            trending_queries: self.trending_query_list(),
            fallback_query: self.trending_fallback_query.clone(),
            trending_query_delay: Duration::from_millis(self.trending_query_delay_ms),
            search_ttl: Duration::from_secs(self.search_cache_ttl_secs),
            book_ttl: Duration::from_secs(self.book_cache_ttl_secs),
            trending_ttl: Duration::from_secs(self.trending_cache_ttl_secs),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            search: self.search_cache_size,
            books: self.book_cache_size,
            trending: self.trending_cache_size,
            dashboard: self.dashboard_cache_size,
        }
    }

    pub fn catalog_caches(&self) -> CatalogCaches {
        CatalogCaches::with_capacity(
            &self.catalog_settings(),
            self.search_cache_size,
            self.book_cache_size,
            self.trending_cache_size,
        )
    }

    pub fn dashboard_cache(&self) -> TtlCache<DashboardPayload> {
        TtlCache::new(
            "dashboard",
            self.dashboard_cache_size,
            crate::dashboard::DASHBOARD_TTL,
        )
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            api: RateLimitRule::new(
                self.api_rate_limit,
                Duration::from_secs(self.api_rate_window_secs),
            ),
            search: RateLimitRule::new(
                self.search_rate_limit,
                Duration::from_secs(self.search_rate_window_secs),
            ),
            auth: RateLimitRule::new(
                self.auth_rate_limit,
                Duration::from_secs(self.auth_rate_window_secs),
            ),
        }
    }

    pub fn trusted_proxy_list(&self) -> Result<Vec<IpAddr>, ConfigError> {
        self.trusted_proxies
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(|ip| {
                ip.parse().map_err(|_| {
                    ConfigError::Invalid(format!("Invalid trusted proxy address '{}'", ip))
                })
            })
            .collect()
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn trending_request_timeout(&self) -> Duration {
        Duration::from_secs(self.trending_request_timeout_secs)
    }
}
