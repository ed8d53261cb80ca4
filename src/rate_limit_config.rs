use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-window ceiling: at most `max_requests` per `window`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

/// Endpoint classes that each get an independent limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterClass {
    Api,
    Search,
    Auth,
}

impl LimiterClass {
    pub fn name(&self) -> &'static str {
        match self {
            LimiterClass::Api => "api",
            LimiterClass::Search => "search",
            LimiterClass::Auth => "auth",
        }
    }
}

/// Rules for every limiter class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub api: RateLimitRule,
    pub search: RateLimitRule,
    pub auth: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: RateLimitRule::new(100, Duration::from_secs(60)),
            search: RateLimitRule::new(30, Duration::from_secs(60)),
            auth: RateLimitRule::new(5, Duration::from_secs(15 * 60)),
        }
    }
}

impl RateLimitConfig {
    pub fn get_rule(&self, class: LimiterClass) -> &RateLimitRule {
        match class {
            LimiterClass::Api => &self.api,
            LimiterClass::Search => &self.search,
            LimiterClass::Auth => &self.auth,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for class in [LimiterClass::Api, LimiterClass::Search, LimiterClass::Auth] {
            self.get_rule(class)
                .validate()
                .map_err(|e| format!("{} limiter: {}", class.name(), e))?;
        }
        Ok(())
    }
}

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn from_millis(max_requests: u32, window_ms: u64) -> Self {
        Self::new(max_requests, Duration::from_millis(window_ms))
    }

    /// Validate rule parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("Max requests must be greater than 0".to_string());
        }
        if self.window.is_zero() {
            return Err("Window size must be greater than 0".to_string());
        }
        Ok(())
    }
}
