use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod blockchain;
mod config;
mod db;
mod metrics;
mod models;
mod services;
mod websocket;

use crate::blockchain::LedgerClient;
use crate::config::AppConfig;
use crate::db::Database;
use crate::services::match_store::MatchStore;
use crate::services::matchmaking::MatchmakingQueue;
use crate::services::oracle::{HttpPriceFeed, PriceOracle};
use crate::services::orchestrator::MatchOrchestrator;
use crate::services::registry::ConnectionRegistry;
use crate::services::settlement::SettlementBridge;
use crate::services::timers::TimerRegistry;

pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub match_store: Arc<MatchStore>,
    pub queue: Arc<MatchmakingQueue>,
    pub oracle: Arc<PriceOracle>,
    pub orchestrator: Arc<MatchOrchestrator>,
    pub ledger: Option<Arc<LedgerClient>>,
    pub db: Option<Arc<Database>>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duelarena_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting DuelArena Backend v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Initialize Prometheus metrics
    let metrics_handle = metrics::init_metrics()?;
    tracing::info!("Prometheus metrics initialized");

    // Initialize database (optional, history only)
    let db = match config.database_url.as_deref() {
        Some(url) => match Database::connect(url).await {
            Ok(db) => {
                tracing::info!("Database connected");
                Some(Arc::new(db))
            }
            Err(e) => {
                tracing::warn!("Database unavailable, match history disabled: {}", e);
                None
            }
        },
        None => {
            tracing::info!("No database configured, match history disabled");
            None
        }
    };

    // Initialize escrow ledger client (optional)
    let ledger = config.create_ledger_client().map(|client| {
        tracing::info!(
            "Ledger client initialized: chain_id={}, signer={}",
            client.chain_id(),
            client.has_signer()
        );
        Arc::new(client)
    });
    if ledger.is_none() {
        tracing::info!("Ledger not configured, settlements will be simulated");
    }

    // Core services
    let registry = Arc::new(ConnectionRegistry::new());
    let match_store = Arc::new(MatchStore::new());
    let queue = Arc::new(MatchmakingQueue::new());
    let timers = Arc::new(TimerRegistry::new());

    let feed = HttpPriceFeed::new(&config.price_feed_url, config.price_feed_timeout_ms);
    let oracle = Arc::new(PriceOracle::new(Arc::new(feed), config.price_cache_ms));
    tracing::info!("Price oracle initialized against {}", config.price_feed_url);

    let settlement = Arc::new(SettlementBridge::new(
        ledger.clone(),
        config.effective_rake_bps(),
        &config.explorer_base_url,
        config.token_decimals,
    ));
    tracing::info!(
        "Settlement bridge initialized (on-chain: {}, rake: {} bps)",
        settlement.is_enabled(),
        settlement.rake_bps()
    );

    let orchestrator = Arc::new(MatchOrchestrator::new(
        Arc::clone(&match_store),
        Arc::clone(&queue),
        Arc::clone(&registry),
        timers,
        Arc::clone(&oracle),
        settlement,
        db.clone(),
        &config,
    ));
    tracing::info!("Match orchestrator initialized");

    // Sweep dead connections out of the registry periodically
    {
        let registry = Arc::clone(&registry);
        let sweep_secs = config.registry_sweep_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
            loop {
                interval.tick().await;
                let removed = registry.prune();
                if removed > 0 {
                    tracing::debug!("Pruned {} dead connections", removed);
                }
            }
        });
    }

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        match_store,
        queue,
        oracle,
        orchestrator,
        ledger,
        db,
        metrics_handle,
        started_at: Instant::now(),
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/v1", api::routes::create_router())
        .nest("/ws", websocket::routes::create_router(state.clone()))
        .layer(middleware::from_fn(api::middleware::metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> String {
    state.metrics_handle.render()
}
