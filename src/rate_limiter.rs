use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::rate_limit_config::{LimiterClass, RateLimitConfig, RateLimitRule};
use crate::response::RateLimitHeaders;

/// Fixed-window admission control, keyed by client identifier.
pub struct RateLimiter {
    name: String,
    max_requests: u32,
    window: Duration,
    counters: Mutex<HashMap<String, WindowCounter>>,
}

/// Requests seen from one identifier in its current window
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_reset_at: Instant,
}

impl WindowCounter {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_reset_at
    }
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_rule(name: impl Into<String>, rule: &RateLimitRule) -> Self {
        Self::new(name, rule.max_requests, rule.window)
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, WindowCounter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request from `identifier` and report whether it may proceed.
    pub fn is_allowed(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut counters = self.counters();

        if counters
            .get(identifier)
            .is_some_and(|counter| counter.is_expired(now))
        {
            counters.remove(identifier);
        }

        match counters.get_mut(identifier) {
            Some(counter) => {
                counter.count = counter.count.saturating_add(1);
                let allowed = counter.count <= self.max_requests;
                if !allowed {
                    tracing::debug!(
                        limiter = %self.name,
                        identifier = %identifier,
                        count = counter.count,
                        "Rate limit exceeded"
                    );
                }
                allowed
            }
            None => {
                counters.insert(
                    identifier.to_string(),
                    WindowCounter {
                        count: 1,
                        window_reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    fn active_counter(&self, identifier: &str) -> Option<WindowCounter> {
        let now = Instant::now();
        self.counters()
            .get(identifier)
            .copied()
            .filter(|counter| !counter.is_expired(now))
    }

    /// Requests still available to `identifier` in its current window.
    pub fn remaining_requests(&self, identifier: &str) -> u32 {
        match self.active_counter(identifier) {
            Some(counter) => self.max_requests.saturating_sub(counter.count),
            None => self.max_requests,
        }
    }

    /// Wall-clock end of the identifier's window, or now when it has none.
    pub fn reset_time(&self, identifier: &str) -> SystemTime {
        let wall_now = SystemTime::now();
        match self.active_counter(identifier) {
            Some(counter) => {
                wall_now + counter.window_reset_at.saturating_duration_since(Instant::now())
            }
            None => wall_now,
        }
    }

    pub fn headers(&self, identifier: &str) -> RateLimitHeaders {
        let reset_ms = self
            .reset_time(identifier)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        RateLimitHeaders::new(
            self.max_requests,
            self.remaining_requests(identifier),
            reset_ms.div_ceil(1000),
        )
    }

    /// Drop counters whose window has closed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters();
        let initial_count = counters.len();

        counters.retain(|_, counter| !counter.is_expired(now));

        initial_count - counters.len()
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.counters().len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// The independent limiter instances used by the HTTP surface.
pub struct RateLimiters {
    pub api: RateLimiter,
    pub search: RateLimiter,
    pub auth: RateLimiter,
}

impl RateLimiters {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            api: RateLimiter::from_rule(LimiterClass::Api.name(), &config.api),
            search: RateLimiter::from_rule(LimiterClass::Search.name(), &config.search),
            auth: RateLimiter::from_rule(LimiterClass::Auth.name(), &config.auth),
        }
    }

    pub fn get(&self, class: LimiterClass) -> &RateLimiter {
        match class {
            LimiterClass::Api => &self.api,
            LimiterClass::Search => &self.search,
            LimiterClass::Auth => &self.auth,
        }
    }
}
