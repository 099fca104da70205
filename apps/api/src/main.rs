mod click_meter;
mod config;
mod db;
mod errors;
mod generation;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::click_meter::ClickMeterClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::generation::profile_selector::build_selector;
use crate::generation::progress::RedisProgressChannel;
use crate::generation::rate_gate::RateGate;
use crate::generation::run_lock::RunLocks;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Promoter API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis (progress notifications)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize tracking service client
    let click_meter = ClickMeterClient::new(
        &config.click_meter_api_url,
        config.click_meter_api_key.clone(),
    )?;
    if config.click_meter_api_key.is_none() {
        info!("CLICK_METER_API_KEY not set; only local tracking links will work");
    }
    info!(
        "Tracking gate: {} calls/sec (throttle {})",
        config.tracking_gate_capacity(),
        if config.throttle_enabled { "on" } else { "off" }
    );

    // Build app state
    let state = AppState {
        db,
        click_meter,
        tracking_gate: Arc::new(RateGate::new(
            config.throttle_enabled,
            config.rate_gate_max_wait,
        )),
        profile_selector: build_selector(config.profile_selection),
        progress: Arc::new(RedisProgressChannel::new(redis)),
        run_locks: RunLocks::new(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
