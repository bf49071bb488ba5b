//! Arbitrix API Server
//!
//! HTTP API server with health check, metrics, and strategy read/control
//! endpoints. This service is stateless and can be horizontally scaled;
//! the worker owns the strategy state.

use arbitrix::cache::RedisCache;
use arbitrix::config;
use arbitrix::core::http::{start_server, AppState, HealthStatus};
use arbitrix::db::StrategyStore;
use arbitrix::jobs::types::{ClosePositionJob, FetchRatesJob};
use arbitrix::logging;
use arbitrix::metrics::Metrics;
use apalis_redis::RedisStorage;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    // Initialize logging based on environment
    logging::init_logging();

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let env = config::get_environment();
    info!("Starting Arbitrix API Server");
    info!(environment = %env, "Environment");
    info!(port = port, "HTTP Server: http://0.0.0.0:{}", port);
    info!("This service is stateless and can be horizontally scaled");

    let metrics = Arc::new(Metrics::new()?);

    // Database connection (optional - history endpoints return 503 without it)
    let database = match StrategyStore::new().await {
        Ok(db) => {
            info!("QuestDB connected for API server");
            metrics.database_connected.set(1.0);
            Some(Arc::new(db))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to QuestDB - history endpoints will be unavailable");
            None
        }
    };

    // Cache connection (optional - status/rates endpoints return 503 without it)
    let cache = match RedisCache::new().await {
        Ok(c) => {
            info!("Redis connected for API server");
            metrics.cache_connected.set(1.0);
            Some(Arc::new(c))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis - status endpoints will be unavailable");
            None
        }
    };

    // Job storages for the control endpoints (optional)
    let (fetch_storage, close_storage) = match apalis_redis::connect(config::get_redis_url()).await
    {
        Ok(conn) => {
            let fetch: Arc<RedisStorage<FetchRatesJob>> =
                Arc::new(RedisStorage::new(conn.clone()));
            let close: Arc<RedisStorage<ClosePositionJob>> = Arc::new(RedisStorage::new(conn));
            (Some(fetch), Some(close))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to job queue - control endpoints will be unavailable");
            (None, None)
        }
    };

    let state = AppState {
        health: Arc::new(RwLock::new(HealthStatus::default())),
        metrics: metrics.clone(),
        start_time: Arc::new(Instant::now()),
        database,
        cache,
        fetch_storage,
        close_storage,
    };

    // Start HTTP server
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, state).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Graceful shutdown
    info!("API server started, waiting for shutdown signal...");
    info!("Note: the worker runs as a separate process. Use 'cargo run --bin worker' to start it.");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down API server...");
            info!("API server stopped");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    Ok(())
}
