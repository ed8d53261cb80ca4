use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::auth::{authorize_user, SessionVerifier};
use crate::catalog::CatalogClient;
use crate::config_validator::ApiKeyStatus;
use crate::dashboard::DashboardAggregator;
use crate::error::ApiError;
use crate::health::HealthChecker;
use crate::metrics::MetricsCollector;
use crate::middleware::{ClientIp, TrustedProxies};
use crate::rate_limit_config::LimiterClass;
use crate::rate_limiter::RateLimiters;
use crate::response::{EmptyListingError, TrendingResponse};
use crate::validation::{DashboardParams, RequestValidator, SearchParams, TrendingParams};

pub const TRENDING_CACHE_CONTROL: &str = "public, s-maxage=3600, stale-while-revalidate=86400";

/// Shared application state. Every component synchronizes internally.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogClient,
    pub dashboard: DashboardAggregator,
    pub limiters: Arc<RateLimiters>,
    pub metrics: MetricsCollector,
    pub sessions: Arc<dyn SessionVerifier>,
    pub health: Arc<HealthChecker>,
    pub api_key_status: ApiKeyStatus,
    /// Overall bound on the trending endpoint.
    pub trending_timeout: Duration,
    pub trusted_proxies: TrustedProxies,
}

impl AppState {
    /// Count a request against the `search` limiter, failing with 429 once it denies.
    async fn admit_search(&self, client_ip: &str) -> Result<(), ApiError> {
        let limiter = &self.limiters.search;
        let allowed = limiter.is_allowed(client_ip);
        self.metrics
            .record_request(LimiterClass::Search, client_ip, allowed)
            .await;

        if allowed {
            Ok(())
        } else {
            Err(ApiError::RateLimitExceeded(limiter.headers(client_ip)))
        }
    }
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
}

/// `GET /api/books/search?q=&maxResults=`
pub async fn search_books(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    state.admit_search(&client_ip).await?;

    let (q, max_results) = RequestValidator::validate_search(query_params(query)?)?;
    let results = state.catalog.search(&q, max_results).await;

    let mut response = Json(results).into_response();
    state.limiters.search.headers(&client_ip).apply(response.headers_mut());
    Ok(response)
}

/// `GET /api/books/trending?limit=`
pub async fn trending_books(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    query: Result<Query<TrendingParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    state.admit_search(&client_ip).await?;

    let limit = RequestValidator::validate_trending(query_params(query)?)?;

    let mut response = match timeout(state.trending_timeout, state.catalog.trending(limit)).await {
        Ok(results) => {
            let mut response =
                Json(TrendingResponse::fresh(results.items, results.total_items)).into_response();
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(TRENDING_CACHE_CONTROL),
            );
            response
        }
        Err(_) => {
            error!(limit, timeout = ?state.trending_timeout, "Trending request timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(EmptyListingError::new(
                    "Request timeout. Please try again later.",
                )),
            )
                .into_response()
        }
    };

    state.limiters.search.headers(&client_ip).apply(response.headers_mut());
    Ok(response)
}

/// `GET /api/books/:id`
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("Book not found".to_string());

    let id = RequestValidator::validate_book_id(&id).map_err(|_| not_found())?;
    match state.catalog.get_by_id(&id).await {
        Ok(book) => Ok(Json(book).into_response()),
        Err(err) => {
            warn!(book_id = %id, error = %err, "Book lookup failed");
            Err(not_found())
        }
    }
}

/// `GET /api/dashboard/combined?userId=`
pub async fn dashboard_combined(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    query: Result<Query<DashboardParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let user_id = RequestValidator::validate_user_id(query_params(query)?)?;

    authorize_user(
        state.sessions.as_ref(),
        &headers,
        &user_id,
        &state.limiters.auth,
        &client_ip,
    )
    .await?;

    let combined = state.dashboard.combined(&user_id).await;
    Ok(Json(combined).into_response())
}

/// `GET /api/catalog/status`
pub async fn catalog_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.api_key_status.clone())
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health())
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let key_mode = if state.catalog.settings().api_key.is_some() {
        "keyed"
    } else {
        "keyless"
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "catalog": key_mode,
            "queue_length": state.catalog.throttler().queue_len(),
        })),
    )
}

/// Admission metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot().await)
}
