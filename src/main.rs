use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod events;
mod ledger;
mod metrics;
mod models;
mod repository;
mod services;
mod token;
mod utils;
mod websocket;

use crate::config::AppConfig;
use crate::events::EventHub;
use crate::ledger::LedgerClient;
use crate::repository::BookRepository;
use crate::services::admin::AdminService;
use crate::services::lifecycle::OrderLifecycleService;
use crate::services::matching::{EngineConfig, MatchingEngine};
use crate::token::TokenProvider;

/// Both book sides populated but unmatched beyond this emits a stall
/// warning from the matching workers.
const STALL_WARN_AFTER_SECS: u64 = 30;

const EXIT_CONFIG: i32 = 1;
const EXIT_LEDGER_INIT: i32 = 2;

pub struct AppState {
    pub config: AppConfig,
    pub ledger: Arc<LedgerClient>,
    pub repository: Arc<BookRepository>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub admin: Arc<AdminService>,
    pub hub: Arc<EventHub>,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clob_exchange_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Fatal configuration error: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    tracing::info!("Starting CLOB exchange backend v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    metrics::describe();

    // Ledger gateway: operator token + client, then a connectivity probe
    // and template resolution so a dead ledger fails fast.
    let tokens = Arc::new(TokenProvider::new(
        &config.oauth_token_url,
        &config.oauth_client_id,
        &config.oauth_client_secret,
    ));
    let ledger = Arc::new(LedgerClient::new(
        &config.ledger_api_base,
        &config.operator_party_id,
        Arc::clone(&tokens),
        config.ledger_submit_timeout_ms,
    ));

    if let Err(e) = ledger.probe().await {
        tracing::error!("Fatal ledger gateway init failure: {}", e);
        std::process::exit(EXIT_LEDGER_INIT);
    }
    if let Err(e) = ledger.order_book_template().await {
        tracing::error!("Fatal ledger gateway init failure resolving templates: {}", e);
        std::process::exit(EXIT_LEDGER_INIT);
    }
    tracing::info!("Ledger gateway connected at {}", config.ledger_api_base);

    let repository = Arc::new(BookRepository::new(Arc::clone(&ledger)));
    let lifecycle = Arc::new(OrderLifecycleService::new(
        Arc::clone(&ledger),
        Arc::clone(&repository),
    ));

    let engine = Arc::new(MatchingEngine::new(
        Arc::clone(&ledger),
        Arc::clone(&repository),
        EngineConfig {
            sweep_interval: config.sweep_interval(),
            max_conflict_retries: config.matching_max_conflict_retries,
            stall_warn_after: std::time::Duration::from_secs(STALL_WARN_AFTER_SECS),
        },
    ));

    // Event fan-out: ingest the update stream from a cold-start offset of
    // 0 and publish classified events to subscribers.
    let hub = Arc::new(EventHub::new(config.ws_buffer_size));
    let updates = ledger::spawn_update_stream(ledger.stream_url(), Arc::clone(&tokens), 0);
    events::spawn_ingest(Arc::clone(&hub), Arc::clone(&repository), updates);
    tracing::info!("Event fan-out started from ledger offset 0");

    let admin = Arc::new(AdminService::new(
        Arc::clone(&ledger),
        Arc::clone(&repository),
        Arc::clone(&engine),
        Arc::clone(&hub),
        &config.public_party_id,
    ));

    // Start matching workers for every book already on the ledger, then
    // seed any bootstrap pairs that are still missing.
    match ledger.order_book_template().await {
        Ok(template) => match ledger.query_active(&[template], ledger.operator_party()).await {
            Ok(contracts) => {
                for active in contracts {
                    match active.decode::<models::OrderBook>() {
                        Ok(book) => engine.ensure_worker(book.pair),
                        Err(e) => tracing::warn!("Skipping undecodable book at startup: {}", e),
                    }
                }
            }
            Err(e) => tracing::warn!("Could not enumerate books at startup: {}", e),
        },
        Err(e) => tracing::warn!("Could not resolve book template at startup: {}", e),
    }

    let bootstrap = config.bootstrap_pairs();
    if !bootstrap.is_empty() {
        let seeded = admin.seed_pairs(&bootstrap).await;
        tracing::info!("Seeded {}/{} bootstrap trading pairs", seeded, bootstrap.len());
    }

    let ws_path = config.ws_path.clone();
    let http_port = config.http_port;

    let state = Arc::new(AppState {
        config,
        ledger,
        repository,
        lifecycle,
        admin,
        hub,
        metrics: metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route(&ws_path, get(websocket::ws_handler))
        .nest("/api", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    tracing::info!("Server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(EXIT_CONFIG);
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn render_metrics(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> String {
    state.metrics.render()
}
