use axum::http::{HeaderMap, HeaderValue};
use serde::Serialize;

use crate::models::CatalogBook;

/// Client-facing rate-limit headers for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds, rounded up.
    pub reset: u64,
}

impl RateLimitHeaders {
    pub fn new(limit: u32, remaining: u32, reset: u64) -> Self {
        Self {
            limit,
            remaining,
            reset,
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset));
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingResponse {
    pub items: Vec<CatalogBook>,
    pub total_items: u64,
    pub cached: bool,
}

impl TrendingResponse {
    pub fn fresh(items: Vec<CatalogBook>, total_items: u64) -> Self {
        Self {
            items,
            total_items,
            cached: false,
        }
    }
}

/// Error body that still carries an empty `{items, totalItems}` listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyListingError {
    pub error: String,
    pub items: Vec<CatalogBook>,
    pub total_items: u64,
}

impl EmptyListingError {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            items: Vec::new(),
            total_items: 0,
        }
    }
}
