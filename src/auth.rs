//! Caller identity for user-scoped endpoints.
//!
//! Sessions are owned by the auth gateway in front of this service. The
//! gateway forwards the authenticated user id in a header; this module only
//! reads it and checks it against the user a request asks for.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use tracing::warn;

use crate::error::{ApiError, ConfigError};
use crate::rate_limiter::RateLimiter;

pub const DEFAULT_USER_HEADER: &str = "x-authenticated-user";

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// The authenticated user behind this request, if any.
    async fn authenticated_user(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts an identity header set by the fronting gateway.
#[derive(Debug, Clone)]
pub struct HeaderSessionVerifier {
    header: HeaderName,
}

impl HeaderSessionVerifier {
    pub fn new(header: &str) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header.trim().as_bytes()).map_err(|e| {
            ConfigError::Invalid(format!("Invalid identity header '{}': {}", header, e))
        })?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for HeaderSessionVerifier {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_USER_HEADER),
        }
    }
}

#[async_trait]
impl SessionVerifier for HeaderSessionVerifier {
    async fn authenticated_user(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
    }
}

/// Require that the caller is `requested_user`.
///
/// Failed checks count against `limiter` for `client_ip`; once it denies, the
/// caller gets 429 instead of 401.
pub async fn authorize_user(
    verifier: &dyn SessionVerifier,
    headers: &HeaderMap,
    requested_user: &str,
    limiter: &RateLimiter,
    client_ip: &str,
) -> Result<String, ApiError> {
    match verifier.authenticated_user(headers).await {
        Some(user) if user == requested_user => Ok(user),
        authenticated => {
            warn!(
                client_ip = %client_ip,
                requested_user = %requested_user,
                authenticated = authenticated.is_some(),
                "Identity check failed"
            );
            if limiter.is_allowed(client_ip) {
                Err(ApiError::Unauthorized)
            } else {
                Err(ApiError::RateLimitExceeded(limiter.headers(client_ip)))
            }
        }
    }
}
