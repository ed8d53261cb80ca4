pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod config_validator;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod health;
pub mod http_client;
pub mod janitor;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod retry;
pub mod server;
pub mod store;
pub mod throttler;
pub mod trending;
pub mod validation;

pub use cache::TtlCache;
pub use catalog::CatalogClient;
pub use config::Config;
pub use error::{ApiError, CatalogError};
pub use rate_limiter::RateLimiter;
pub use server::{build_state, create_app};
pub use throttler::RequestThrottler;
