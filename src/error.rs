use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::response::RateLimitHeaders;

/// Outcome of a paced call that never produced an HTTP status.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("Request queue cleared")]
    QueueCleared,

    #[error("request throttler stopped before dispatch")]
    Closed,
}

/// Classified failure of a catalog operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog access forbidden: {status}")]
    Forbidden { status: u16, body: String },

    #[error("catalog item not found")]
    NotFound,

    #[error("catalog client error: {status}")]
    Client { status: u16 },

    #[error("catalog server error: {status}")]
    Server { status: u16 },

    #[error("catalog request timed out after {0:?}")]
    Timeout(Duration),

    #[error("catalog network error: {0}")]
    Network(String),

    #[error("catalog request cancelled: {0}")]
    Cancelled(String),

    #[error("malformed catalog response: {0}")]
    Malformed(String),

    #[error("invalid catalog url: {0}")]
    InvalidUrl(String),
}

impl CatalogError {
    /// Map a non-success HTTP status to its error class.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            403 => CatalogError::Forbidden { status, body },
            404 => CatalogError::NotFound,
            500..=599 => CatalogError::Server { status },
            _ => CatalogError::Client { status },
        }
    }

    /// Only provider-side 5xx and connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Server { .. } | CatalogError::Network(_))
    }
}

impl From<TransportError> for CatalogError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => CatalogError::Network(msg),
            other => CatalogError::Cancelled(other.to_string()),
        }
    }
}

/// Failure of one of the dashboard's data sources.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}

/// Rejected or unloadable service configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded(RateLimitHeaders),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::InvalidRequest(msg) => Self::new("bad_request", msg, 400),
            ApiError::ValidationError(msg) => Self::new("validation_error", msg, 400),
            ApiError::RateLimitExceeded(_) => Self::new(
                "rate_limit_exceeded",
                "Too many requests. Please try again later.",
                429,
            ),
            ApiError::Unauthorized => Self::new("unauthorized", "Unauthorized", 401),
            ApiError::NotFound(msg) => Self::new("not_found", msg, 404),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_api_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimitExceeded(headers) = &self {
            headers.apply(response.headers_mut());
        }
        response
    }
}
