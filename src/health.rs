use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::janitor::Sweep;
use crate::throttler::RequestThrottler;

/// Queued catalog calls beyond which the service reports itself degraded.
pub const QUEUE_BACKLOG_THRESHOLD: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
    /// Entry count per cache and limiter.
    pub caches: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub catalog: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub queue_length: usize,
    pub processing: bool,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    throttler: RequestThrottler,
    stores: Vec<Arc<dyn Sweep>>,
}

impl HealthChecker {
    pub fn new(throttler: RequestThrottler, stores: Vec<Arc<dyn Sweep>>) -> Self {
        // Uptime counts from the first checker, i.e. service start.
        std::sync::LazyLock::force(&START_TIME);
        Self { throttler, stores }
    }

    pub fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let catalog = self.check_catalog_queue();
        let overall_status = if catalog.status == "healthy" {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus { catalog },
            caches: self
                .stores
                .iter()
                .map(|store| (store.name().to_string(), store.len()))
                .collect(),
        }
    }

    fn check_catalog_queue(&self) -> ServiceStatus {
        let queue_length = self.throttler.queue_len();
        let processing = self.throttler.is_processing();

        if queue_length > QUEUE_BACKLOG_THRESHOLD {
            ServiceStatus {
                status: "degraded".to_string(),
                queue_length,
                processing,
                error: Some(format!("{} catalog requests waiting", queue_length)),
            }
        } else {
            ServiceStatus {
                status: "healthy".to_string(),
                queue_length,
                processing,
                error: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::http_client::mock::MockTransport;
    use crate::http_client::CatalogTransport;
    use std::time::Duration;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            dependencies: DependencyStatus {
                catalog: ServiceStatus {
                    status: "healthy".to_string(),
                    queue_length: 0,
                    processing: false,
                    error: None,
                },
            },
            caches: BTreeMap::from([("search".to_string(), 3)]),
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
        assert!(json.contains(r#""search":3"#));
    }

    #[tokio::test]
    async fn test_reports_cache_sizes() {
        let throttler = RequestThrottler::new(
            Arc::new(MockTransport::new()) as Arc<dyn CatalogTransport>,
            Duration::from_millis(400),
        );
        let books: Arc<TtlCache<String>> =
            Arc::new(TtlCache::new("books", 10, Duration::from_secs(60)));
        books.insert("book:1", "Dune".to_string());

        let checker = HealthChecker::new(throttler, vec![books as Arc<dyn Sweep>]);
        let health = checker.check_health();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.caches["books"], 1);
        assert_eq!(health.dependencies.catalog.queue_length, 0);
        assert!(!health.dependencies.catalog.processing);
    }
}
