//! Tap Rush Back binary entrypoint wiring the REST surface, cache tier, and
//! durable store supervision.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = AppConfig::load();
    let app_state = AppState::new(app_config);

    install_cache_tier(&app_state).await;
    spawn_durable_supervisor(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the cache tier. The Redis backend connects lazily and fails open
/// per call, so installation never blocks startup.
#[cfg(feature = "redis-cache")]
async fn install_cache_tier(state: &SharedState) {
    use dao::cache::redis::{RedisCacheStore, RedisConfig};

    let redis_config = RedisConfig::from_env();
    match RedisCacheStore::new(redis_config) {
        Ok(store) => {
            state.install_cache(Arc::new(store)).await;
            info!("Redis cache tier installed");
        }
        Err(err) => {
            warn!(error = %err, "invalid Redis configuration; running without a cache tier");
        }
    }
}

/// Without the Redis feature, a process-local store still exercises the
/// cache-dependent paths (rate limits, locks, leaderboard).
#[cfg(not(feature = "redis-cache"))]
async fn install_cache_tier(state: &SharedState) {
    use dao::cache::memory::MemoryCacheStore;

    state.install_cache(Arc::new(MemoryCacheStore::new())).await;
    warn!("redis-cache feature disabled; using the in-process cache store");
}

/// Supervise the MongoDB durable store, reconnecting in the background and
/// toggling degraded mode when connectivity changes.
#[cfg(feature = "mongo-store")]
fn spawn_durable_supervisor(state: SharedState) {
    use dao::durable::DurableStore;
    use dao::durable::mongodb::{MongoConfig, MongoDurableStore};

    let mongo_uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let mongo_db = env::var("MONGO_DB").ok();

    tokio::spawn(services::storage_supervisor::run(state, move || {
        let uri = mongo_uri.clone();
        let db = mongo_db.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db.as_deref()).await?;
            let store = MongoDurableStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn DurableStore>)
        }
    }));
}

/// Without the Mongo feature the in-memory store is authoritative; state
/// does not survive restarts.
#[cfg(not(feature = "mongo-store"))]
fn spawn_durable_supervisor(state: SharedState) {
    use dao::durable::memory::MemoryDurableStore;

    tokio::spawn(async move {
        state
            .install_durable(Arc::new(MemoryDurableStore::new()))
            .await;
        warn!("mongo-store feature disabled; durable records are in-process only");
    });
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
