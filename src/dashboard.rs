//! One combined dashboard payload per user: stats, recent activity, trending.
//!
//! The three sources are fetched concurrently and each one may fail on its
//! own. A failed section is replaced by its default value and reported in
//! `errors`; the other sections are returned untouched.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{cache_key, TtlCache};
use crate::catalog::TrendingSource;
use crate::models::CatalogBook;
use crate::store::{DashboardStore, ReadingStats, RecentActivity};

pub const ACTIVITY_LIMIT: usize = 5;
pub const TRENDING_LIMIT: usize = 6;
pub const DASHBOARD_TTL: Duration = Duration::from_secs(5 * 60);

const STATS_ERROR: &str = "Failed to load reading statistics";
const ACTIVITIES_ERROR: &str = "Failed to load recent activity";
const TRENDING_ERROR: &str = "Failed to load trending books";

/// Per-section failure messages; `None` means the section loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionErrors {
    pub stats: Option<String>,
    pub activities: Option<String>,
    pub trending: Option<String>,
}

impl SectionErrors {
    pub fn any(&self) -> bool {
        self.stats.is_some() || self.activities.is_some() || self.trending.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    pub stats: ReadingStats,
    pub activities: Vec<RecentActivity>,
    pub trending: Vec<CatalogBook>,
    pub errors: SectionErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub payload: DashboardPayload,
    pub cached: bool,
}

#[derive(Clone)]
pub struct DashboardAggregator {
    store: Arc<dyn DashboardStore>,
    trending: Arc<dyn TrendingSource>,
    cache: Arc<TtlCache<DashboardPayload>>,
}

impl DashboardAggregator {
    pub fn new(
        store: Arc<dyn DashboardStore>,
        trending: Arc<dyn TrendingSource>,
        cache: Arc<TtlCache<DashboardPayload>>,
    ) -> Self {
        Self {
            store,
            trending,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<DashboardPayload>> {
        &self.cache
    }

    pub async fn combined(&self, user_id: &str) -> DashboardResponse {
        let key = cache_key("dashboard", [user_id]);
        if let Some(payload) = self.cache.get(&key) {
            debug!(user_id = %user_id, "Dashboard cache hit");
            return DashboardResponse {
                payload,
                cached: true,
            };
        }

        let (stats, activities, trending) = tokio::join!(
            self.store.reading_stats(user_id),
            self.store.recent_activity(user_id, ACTIVITY_LIMIT),
            self.trending.trending_books(TRENDING_LIMIT),
        );

        let mut errors = SectionErrors::default();

        let stats = stats.unwrap_or_else(|err| {
            warn!(user_id = %user_id, error = %err, "Dashboard stats unavailable");
            errors.stats = Some(STATS_ERROR.to_string());
            ReadingStats::default()
        });
        let activities = activities.unwrap_or_else(|err| {
            warn!(user_id = %user_id, error = %err, "Dashboard activity unavailable");
            errors.activities = Some(ACTIVITIES_ERROR.to_string());
            Vec::new()
        });
        let trending = trending.unwrap_or_else(|err| {
            warn!(user_id = %user_id, error = %err, "Dashboard trending unavailable");
            errors.trending = Some(TRENDING_ERROR.to_string());
            Vec::new()
        });

        if errors.any() {
            warn!(user_id = %user_id, errors = ?errors, "Serving partial dashboard");
        }

        let payload = DashboardPayload {
            stats,
            activities,
            trending,
            errors,
        };
        self.cache.set(key, payload.clone(), DASHBOARD_TTL);

        DashboardResponse {
            payload,
            cached: false,
        }
    }
}
