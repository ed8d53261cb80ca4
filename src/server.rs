use crate::auth::{HeaderSessionVerifier, SessionVerifier};
use crate::catalog::{CatalogClient, TrendingSource};
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::dashboard::DashboardAggregator;
use crate::error::ConfigError;
use crate::handlers::{
    catalog_status, dashboard_combined, get_book, health_check, metrics, readiness_check,
    search_books, trending_books, AppState,
};
use crate::health::HealthChecker;
use crate::http_client::{CatalogTransport, HttpTransport};
use crate::janitor::{spawn_janitor, JanitorHandle, Sweep};
use crate::metrics::MetricsCollector;
use crate::middleware::{api_rate_limit, logging_middleware, TrustedProxies};
use crate::rate_limiter::RateLimiters;
use crate::store::{DashboardStore, MemoryStore};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Everything the router needs plus the stores the janitor sweeps.
pub struct ServiceParts {
    pub state: AppState,
    pub sweep_targets: Vec<Arc<dyn Sweep>>,
}

/// Wire the components for `config` around the given collaborators.
pub fn build_state(
    config: &Config,
    transport: Arc<dyn CatalogTransport>,
    store: Arc<dyn DashboardStore>,
    sessions: Arc<dyn SessionVerifier>,
) -> Result<ServiceParts, ConfigError> {
    let trusted_proxies = TrustedProxies::new(config.trusted_proxy_list()?);
    if !trusted_proxies.is_empty() {
        tracing::info!(proxies = %config.trusted_proxies, "Trusting forwarding headers from proxies");
    }

    let caches = config.catalog_caches();
    let catalog = CatalogClient::new(config.catalog_settings(), transport, caches.clone())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let dashboard_cache = Arc::new(config.dashboard_cache());
    let dashboard = DashboardAggregator::new(
        store,
        Arc::new(catalog.clone()) as Arc<dyn TrendingSource>,
        Arc::clone(&dashboard_cache),
    );

    let limiters = Arc::new(RateLimiters::new(&config.rate_limit_config()));

    let sweep_targets: Vec<Arc<dyn Sweep>> = vec![
        caches.search as Arc<dyn Sweep>,
        caches.books as Arc<dyn Sweep>,
        caches.trending as Arc<dyn Sweep>,
        dashboard_cache as Arc<dyn Sweep>,
        Arc::clone(&limiters) as Arc<dyn Sweep>,
    ];

    let health = HealthChecker::new(catalog.throttler().clone(), sweep_targets.clone());
    let api_key_status = ConfigValidator::api_key_status(
        config.catalog_api_key.as_deref(),
        config.catalog_use_api_key,
    );

    let state = AppState {
        catalog,
        dashboard,
        limiters,
        metrics: MetricsCollector::new(),
        sessions,
        health: Arc::new(health),
        api_key_status,
        trending_timeout: config.trending_request_timeout(),
        trusted_proxies,
    };

    Ok(ServiceParts {
        state,
        sweep_targets,
    })
}

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/books/search", get(search_books))
        .route("/books/trending", get(trending_books))
        .route("/books/:id", get(get_book))
        .route("/dashboard/combined", get(dashboard_combined))
        .route("/catalog/status", get(catalog_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_rate_limit));

    Router::new()
        .nest("/api", api)
        // Health, readiness and metrics endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    janitor: JanitorHandle,
}

impl Server {
    /// Validate `config` and build the production service: reqwest transport,
    /// in-memory store and gateway-header sessions.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        ConfigValidator::validate_config(&config)?;

        let transport = HttpTransport::new()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;
        let sessions = HeaderSessionVerifier::new(&config.auth_user_header)?;

        let parts = build_state(
            &config,
            Arc::new(transport),
            Arc::new(MemoryStore::new()),
            Arc::new(sessions),
        )?;

        let janitor = spawn_janitor(parts.sweep_targets, config.cleanup_interval());

        Ok(Self {
            app: create_app(parts.state),
            bind_addr: config.bind_addr,
            janitor,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Volume server starting on {}", self.bind_addr);
        tracing::info!("Health check available at /health");
        tracing::info!("Readiness check available at /ready");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.janitor.stop().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
