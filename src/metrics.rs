use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::rate_limit_config::LimiterClass;

/// Clients beyond the tracking cap are counted under this id.
pub const OVERFLOW_CLIENT: &str = "other";
pub const DEFAULT_MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub throttled_requests: u64,
    pub last_reset: u64,
}

impl Default for ThrottleMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            allowed_requests: 0,
            throttled_requests: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl ThrottleMetrics {
    fn record(&mut self, allowed: bool) {
        self.total_requests += 1;
        if allowed {
            self.allowed_requests += 1;
        } else {
            self.throttled_requests += 1;
        }
    }

    fn absorb(&mut self, other: &ThrottleMetrics) {
        self.total_requests += other.total_requests;
        self.allowed_requests += other.allowed_requests;
        self.throttled_requests += other.throttled_requests;
    }
}

/// Body of `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub global: ThrottleMetrics,
    pub limiters: BTreeMap<String, ThrottleMetrics>,
    pub tracked_clients: usize,
    pub clients: BTreeMap<String, ThrottleMetrics>,
}

/// Admission decisions, per client and per limiter.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    client_metrics: Arc<RwLock<HashMap<String, ThrottleMetrics>>>,
    limiter_metrics: Arc<RwLock<HashMap<LimiterClass, ThrottleMetrics>>>,
    max_clients: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_max_clients(DEFAULT_MAX_TRACKED_CLIENTS)
    }

    pub fn with_max_clients(max_clients: usize) -> Self {
        Self {
            client_metrics: Arc::new(RwLock::new(HashMap::new())),
            limiter_metrics: Arc::new(RwLock::new(HashMap::new())),
            max_clients,
        }
    }

    pub async fn record_request(&self, class: LimiterClass, client_id: &str, allowed: bool) {
        {
            let mut metrics = self.client_metrics.write().await;
            let key = if metrics.contains_key(client_id) || metrics.len() < self.max_clients {
                client_id
            } else {
                OVERFLOW_CLIENT
            };
            metrics.entry(key.to_string()).or_default().record(allowed);
        }

        self.limiter_metrics
            .write()
            .await
            .entry(class)
            .or_default()
            .record(allowed);
    }

    pub async fn get_client_metrics(&self, client_id: &str) -> Option<ThrottleMetrics> {
        self.client_metrics.read().await.get(client_id).cloned()
    }

    pub async fn get_limiter_metrics(&self, class: LimiterClass) -> Option<ThrottleMetrics> {
        self.limiter_metrics.read().await.get(&class).cloned()
    }

    pub async fn reset_client_metrics(&self, client_id: &str) {
        let mut metrics = self.client_metrics.write().await;
        if let Some(client_metrics) = metrics.get_mut(client_id) {
            *client_metrics = ThrottleMetrics::default();
        }
    }

    pub async fn get_global_metrics(&self) -> ThrottleMetrics {
        let metrics = self.limiter_metrics.read().await;
        let mut global = ThrottleMetrics::default();
        for limiter_metrics in metrics.values() {
            global.absorb(limiter_metrics);
        }
        global
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let global = self.get_global_metrics().await;
        let limiters = self
            .limiter_metrics
            .read()
            .await
            .iter()
            .map(|(class, metrics)| (class.name().to_string(), metrics.clone()))
            .collect();
        let clients: BTreeMap<String, ThrottleMetrics> = self
            .client_metrics
            .read()
            .await
            .iter()
            .map(|(client, metrics)| (client.clone(), metrics.clone()))
            .collect();

        MetricsSnapshot {
            global,
            limiters,
            tracked_clients: clients.len(),
            clients,
        }
    }
}
