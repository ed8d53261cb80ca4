//! Timeout, retry and error classification around throttled catalog calls.

use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::error::CatalogError;
use crate::http_client::{OutboundRequest, TransportResponse};
use crate::throttler::RequestThrottler;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Bound on one attempt, queue wait included.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): base doubling, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Turn a raw response into success or a classified error.
pub fn classify(response: TransportResponse) -> Result<TransportResponse, CatalogError> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    if status == 403 {
        error!(status, body = %response.body, "Catalog access forbidden");
    }
    Err(CatalogError::from_status(status, response.body))
}

/// Run `request` through the throttler, retrying only transient failures.
pub async fn fetch_with_retry(
    throttler: &RequestThrottler,
    request: &OutboundRequest,
    policy: &RetryPolicy,
) -> Result<TransportResponse, CatalogError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let outcome = match timeout(policy.attempt_timeout, throttler.enqueue(request.clone())).await
        {
            Ok(Ok(response)) => classify(response),
            Ok(Err(err)) => Err(CatalogError::from(err)),
            Err(_) => Err(CatalogError::Timeout(policy.attempt_timeout)),
        };

        let err = match outcome {
            Ok(response) => {
                debug!(url = %request.url, attempt, status = response.status, "Catalog request succeeded");
                return Ok(response);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!(url = %request.url, attempt, error = %err, "Catalog request failed permanently");
            return Err(err);
        }

        warn!(url = %request.url, attempt, max_attempts, error = %err, "Transient catalog failure");
        last_error = Some(err);

        if attempt < max_attempts {
            sleep(policy.backoff(attempt)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| CatalogError::Network("no attempt was made".to_string())))
}
