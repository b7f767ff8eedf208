//! Fulfillment API
//!
//! Single-binary service that:
//! 1. Loads the account pool and order stores from disk
//! 2. Serves the admin API for stocking accounts and approving orders
//! 3. Sweeps expired grants and lapsed subscriptions in the background

mod admin;
mod approval;
mod config;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use slot_pool::{AccountStore, Allocator, OrderStore, spawn_expiry_sweep};

use crate::admin::AdminState;
use crate::config::Config;

/// Shared state for the health and metrics endpoints.
#[derive(Clone)]
struct AppState {
    allocator: Arc<Allocator>,
    prometheus: PrometheusHandle,
}

/// Build the axum router: admin API plus health/metrics, with a concurrency
/// limit from `max_connections`.
fn build_router(admin_state: AdminState, app_state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(app_state)
        .merge(admin::build_admin_router(admin_state))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting fulfillment-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_file = %config.pool.accounts_file.display(),
        orders_file = %config.pool.orders_file.display(),
        sweep_interval_secs = config.pool.sweep_interval_secs,
        "configuration loaded"
    );

    if config.admin.auth_token.is_none() {
        warn!("no admin token configured, admin API is unauthenticated");
    }

    let accounts = Arc::new(
        AccountStore::load(config.pool.accounts_file.clone())
            .await
            .context("failed to load account store")?,
    );
    let orders = Arc::new(
        OrderStore::load(config.pool.orders_file.clone())
            .await
            .context("failed to load order store")?,
    );
    info!(
        accounts = accounts.len().await,
        orders = orders.len().await,
        "stores loaded"
    );

    let allocator = Arc::new(Allocator::new(accounts, orders));

    let sweep_handle = spawn_expiry_sweep(
        allocator.clone(),
        Duration::from_secs(config.pool.sweep_interval_secs),
    );

    let admin_state = AdminState::new(allocator.clone(), config.admin.auth_token);
    let app_state = AppState {
        allocator,
        prometheus: prometheus_handle,
    };
    let app = build_router(admin_state, app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweep_handle.abort();
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: pool summary with an HTTP status that tracks pool state.
/// 200 while any account is offerable, 503 once the pool is exhausted.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now_millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let health = state.allocator.accounts().health(now_millis).await;

    let status_code = if health["status"] == "unhealthy" {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        health.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
