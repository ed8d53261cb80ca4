//! Resilient client for the external book catalog.
//!
//! | operation   | cache TTL | on failure                          |
//! |-------------|-----------|-------------------------------------|
//! | `search`    | 30 min    | logged, empty result set returned   |
//! | `get_by_id` | 1 h       | error propagated to the caller      |
//! | `trending`  | 2 h       | failed queries skipped, empty cached |
//!
//! Every operation consults its cache before touching the network. Network
//! calls go through the shared [`RequestThrottler`] and [`fetch_with_retry`].

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::cache::{cache_key, TtlCache};
use crate::error::{CatalogError, StoreError};
use crate::http_client::{CatalogTransport, OutboundRequest};
use crate::models::{CatalogBook, SearchResults};
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::throttler::RequestThrottler;
use crate::trending::{self, DEFAULT_FALLBACK_QUERY, DEFAULT_TRENDING_QUERIES};

/// Provider-side ceiling on results per request.
pub const MAX_RESULTS_CAP: u32 = 40;

static DISALLOWED_QUERY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^\w\s\-'"]"#).expect("static regex"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strip everything but word characters, whitespace, hyphens and quotes, then
/// collapse whitespace.
pub fn sanitize_query(query: &str) -> String {
    let stripped = DISALLOWED_QUERY_CHARS.replace_all(query.trim(), " ");
    WHITESPACE_RUNS.replace_all(&stripped, " ").trim().to_string()
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub base_url: String,
    /// Sent as `key` only when present.
    pub api_key: Option<String>,
    /// Sent as `Referer`.
    pub site_url: String,
    pub min_delay: Duration,
    pub retry: RetryPolicy,
    pub trending_queries: Vec<String>,
    pub fallback_query: String,
    pub trending_query_delay: Duration,
    pub search_ttl: Duration,
    pub book_ttl: Duration,
    pub trending_ttl: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/books/v1".to_string(),
            api_key: None,
            site_url: "http://localhost:3000".to_string(),
            min_delay: Duration::from_millis(400),
            retry: RetryPolicy::default(),
            trending_queries: DEFAULT_TRENDING_QUERIES.iter().map(|q| q.to_string()).collect(),
            fallback_query: DEFAULT_FALLBACK_QUERY.to_string(),
            trending_query_delay: Duration::from_millis(500),
            search_ttl: Duration::from_secs(30 * 60),
            book_ttl: Duration::from_secs(60 * 60),
            trending_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// One cache per catalog domain.
#[derive(Clone)]
pub struct CatalogCaches {
    pub search: Arc<TtlCache<SearchResults>>,
    pub books: Arc<TtlCache<CatalogBook>>,
    pub trending: Arc<TtlCache<SearchResults>>,
}

impl CatalogCaches {
    /// Caches sized by capacity, with the TTLs from `settings`.
    pub fn with_capacity(
        settings: &CatalogSettings,
        search_capacity: usize,
        book_capacity: usize,
        trending_capacity: usize,
    ) -> Self {
        Self {
            search: Arc::new(TtlCache::new("search", search_capacity, settings.search_ttl)),
            books: Arc::new(TtlCache::new("books", book_capacity, settings.book_ttl)),
            trending: Arc::new(TtlCache::new("trending", trending_capacity, settings.trending_ttl)),
        }
    }
}

#[derive(Clone)]
pub struct CatalogClient {
    settings: Arc<CatalogSettings>,
    volumes_url: Url,
    throttler: RequestThrottler,
    caches: CatalogCaches,
}

impl CatalogClient {
    pub fn new(
        settings: CatalogSettings,
        transport: Arc<dyn CatalogTransport>,
        caches: CatalogCaches,
    ) -> Result<Self, CatalogError> {
        let mut volumes_url = Url::parse(&settings.base_url)
            .map_err(|e| CatalogError::InvalidUrl(format!("{}: {}", settings.base_url, e)))?;
        volumes_url
            .path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(settings.base_url.clone()))?
            .pop_if_empty()
            .push("volumes");

        let throttler = RequestThrottler::new(transport, settings.min_delay);

        Ok(Self {
            settings: Arc::new(settings),
            volumes_url,
            throttler,
            caches,
        })
    }

    pub fn throttler(&self) -> &RequestThrottler {
        &self.throttler
    }

    pub fn caches(&self) -> &CatalogCaches {
        &self.caches
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    fn outbound(&self, url: Url) -> OutboundRequest {
        OutboundRequest::get(url.as_str())
            .with_header("Accept", "application/json")
            .with_header("Referer", self.settings.site_url.clone())
    }

    fn search_url(&self, query: &str, max_results: u32) -> Url {
        let mut url = self.volumes_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("maxResults", &max_results.to_string())
                .append_pair("printType", "books")
                .append_pair("projection", "lite")
                .append_pair("orderBy", "relevance");
            if let Some(key) = &self.settings.api_key {
                pairs.append_pair("key", key);
            }
        }
        url
    }

    fn book_url(&self, id: &str) -> Url {
        let mut url = self.volumes_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        if let Some(key) = &self.settings.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        url
    }

    /// Search the catalog. Never fails: problems are logged and yield an empty set.
    pub async fn search(&self, query: &str, max_results: u32) -> SearchResults {
        let sanitized = sanitize_query(query);
        if sanitized.chars().count() < 2 {
            warn!(query = %query, "Invalid or too short query");
            return SearchResults::empty();
        }

        let max_results = max_results.clamp(1, MAX_RESULTS_CAP);
        let key = cache_key("search", [sanitized.clone(), max_results.to_string()]);
        if let Some(cached) = self.caches.search.get(&key) {
            debug!(query = %sanitized, "Search cache hit");
            return cached;
        }

        match self.fetch_search(&sanitized, max_results).await {
            Ok(results) => {
                self.caches
                    .search
                    .set(key, results.clone(), self.settings.search_ttl);
                results
            }
            Err(err) => {
                error!(query = %sanitized, error = %err, "Error fetching books");
                SearchResults::empty()
            }
        }
    }

    async fn fetch_search(&self, query: &str, max_results: u32) -> Result<SearchResults, CatalogError> {
        let request = self.outbound(self.search_url(query, max_results));
        let response = fetch_with_retry(&self.throttler, &request, &self.settings.retry).await?;

        let results: SearchResults = serde_json::from_str(&response.body)
            .map_err(|e| CatalogError::Malformed(e.to_string()))?;
        Ok(results.with_secure_images())
    }

    /// Fetch one book. Failures propagate; the caller decides how to present them.
    pub async fn get_by_id(&self, id: &str) -> Result<CatalogBook, CatalogError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CatalogError::NotFound);
        }

        let key = cache_key("book", [id]);
        if let Some(cached) = self.caches.books.get(&key) {
            debug!(book_id = %id, "Book cache hit");
            return Ok(cached);
        }

        let result = async {
            let request = self.outbound(self.book_url(id));
            let response = fetch_with_retry(&self.throttler, &request, &self.settings.retry).await?;
            serde_json::from_str::<CatalogBook>(&response.body)
                .map(CatalogBook::with_secure_images)
                .map_err(|e| CatalogError::Malformed(e.to_string()))
        }
        .await;

        match result {
            Ok(book) => {
                self.caches.books.set(key, book.clone(), self.settings.book_ttl);
                Ok(book)
            }
            Err(err) => {
                error!(book_id = %id, error = %err, "Error fetching book");
                Err(err)
            }
        }
    }

    /// Aggregate the curated queries into one ranked, deduplicated list.
    ///
    /// Queries run one after another with a pause in between; a burst of
    /// parallel queries is what gets callers blocked by the provider.
    pub async fn trending(&self, limit: usize) -> SearchResults {
        if limit == 0 {
            return SearchResults::empty();
        }

        let key = cache_key("trending", [limit]);
        if let Some(cached) = self.caches.trending.get(&key) {
            debug!(limit, "Trending cache hit");
            return cached;
        }

        let queries = &self.settings.trending_queries;
        let per_query = trending::per_query_limit(limit, queries.len());
        let per_query = u32::try_from(per_query).unwrap_or(MAX_RESULTS_CAP);
        let mut collected: Vec<CatalogBook> = Vec::new();

        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.trending_query_delay).await;
            }

            info!(query = %query, "Fetching trending books");
            let results = self.search(query, per_query).await;
            if results.is_empty() {
                warn!(query = %query, "Trending query returned no books");
            } else {
                info!(query = %query, count = results.items.len(), "Fetched trending books");
                collected.extend(results.items);
            }
        }

        if collected.is_empty() {
            info!(query = %self.settings.fallback_query, "No trending books found, trying fallback");
            sleep(self.settings.trending_query_delay).await;
            let fallback_limit = u32::try_from(limit).unwrap_or(MAX_RESULTS_CAP);
            collected.extend(self.search(&self.settings.fallback_query, fallback_limit).await.items);
        }

        let result = SearchResults::from_items(trending::rank(collected, limit));
        info!(count = result.items.len(), "Trending books aggregated");

        self.caches
            .trending
            .set(key, result.clone(), self.settings.trending_ttl);
        result
    }
}

/// Trending books as one of the dashboard's data sources.
#[async_trait]
pub trait TrendingSource: Send + Sync {
    async fn trending_books(&self, limit: usize) -> Result<Vec<CatalogBook>, StoreError>;
}

#[async_trait]
impl TrendingSource for CatalogClient {
    async fn trending_books(&self, limit: usize) -> Result<Vec<CatalogBook>, StoreError> {
        Ok(self.trending(limit).await.items)
    }
}
