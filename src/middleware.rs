use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::rate_limit_config::LimiterClass;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Forwarding proxies whose `x-forwarded-for` / `x-real-ip` headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<HashSet<IpAddr>>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(Arc::new(proxies.into_iter().collect()))
    }

    pub fn trusts(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromRef<AppState> for TrustedProxies {
    fn from_ref(state: &AppState) -> Self {
        state.trusted_proxies.clone()
    }
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let peer = peer_addr(request.extensions())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        target: "volume::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        peer = %peer,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    info!(
        target: "volume::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Guards every `/api` route with the `api` limiter.
pub async fn api_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client_ip = get_client_ip(
        request.headers(),
        peer_addr(request.extensions()),
        &state.trusted_proxies,
    );
    let limiter = &state.limiters.api;

    let allowed = limiter.is_allowed(&client_ip);
    state
        .metrics
        .record_request(LimiterClass::Api, &client_ip, allowed)
        .await;

    if !allowed {
        return ApiError::RateLimitExceeded(limiter.headers(&client_ip)).into_response();
    }

    next.run(request).await
}

fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
        .or_else(|| extensions.get::<SocketAddr>().copied())
}

/// Client identifier for rate limiting.
///
/// The connection's peer address is authoritative. Forwarding headers are
/// read only when that peer is a trusted proxy; `x-forwarded-for` is walked
/// from the right and the first hop that is not itself a trusted proxy wins.
pub fn get_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &TrustedProxies) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    if !trusted.trusts(peer.ip()) {
        return peer.ip().to_string();
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let hops: Vec<IpAddr> = forwarded
            .split(',')
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();
        if let Some(client) = hops.iter().rev().find(|ip| !trusted.trusts(**ip)) {
            return client.to_string();
        }
        if let Some(first) = hops.first() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return real_ip.to_string();
    }

    peer.ip().to_string()
}

/// Extracts the client identifier used by the rate limiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    TrustedProxies: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trusted = TrustedProxies::from_ref(state);
        Ok(ClientIp(get_client_ip(
            &parts.headers,
            peer_addr(&parts.extensions),
            &trusted,
        )))
    }
}
