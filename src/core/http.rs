//! HTTP endpoint server using Axum
//!
//! Stateless: status and rates come from the Redis cache the worker
//! maintains, history from QuestDB, and control actions are enqueued onto
//! the shared job queue.

use apalis::prelude::Storage;
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, Level};

use crate::cache::RedisCache;
use crate::core::service::RebalanceTrigger;
use crate::db::StrategyStore;
use crate::jobs::types::{ClosePositionJob, FetchRatesJob};
use crate::metrics::Metrics;
use crate::models::funding::ExchangeId;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub database: Option<Arc<StrategyStore>>,
    pub cache: Option<Arc<RedisCache>>,
    pub fetch_storage: Option<Arc<apalis_redis::RedisStorage<FetchRatesJob>>>,
    pub close_storage: Option<Arc<apalis_redis::RedisStorage<ClosePositionJob>>>,
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "service": "arbitrix-strategy-engine"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Increment in-flight requests
    state.metrics.http_requests_in_flight.inc();

    // Process request
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();

    // Decrement in-flight requests
    state.metrics.http_requests_in_flight.dec();

    // Record metrics
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    // Log if error status
    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// Latest strategy status snapshot, as cached by the worker
async fn get_status(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let cache = state.cache.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let status = cache.load_status().await.map_err(|e| {
        error!(error = %e, "Failed to load status snapshot");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match status {
        Some(status) => Ok(Json(json!(status))),
        None => Ok(Json(
            json!({ "running": false, "note": "no status snapshot yet" }),
        )),
    }
}

/// Open positions from the latest status snapshot
async fn get_positions(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let cache = state.cache.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let status = cache.load_status().await.map_err(|e| {
        error!(error = %e, "Failed to load status snapshot");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let positions = status.map(|s| s.open_positions).unwrap_or_default();
    Ok(Json(json!(positions)))
}

/// Recent strategy events from the latest status snapshot
async fn get_events(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let cache = state.cache.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let status = cache.load_status().await.map_err(|e| {
        error!(error = %e, "Failed to load status snapshot");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let events = status.map(|s| s.recent_events).unwrap_or_default();
    Ok(Json(json!(events)))
}

/// All cached funding rates for both venues, including assets without a
/// counterpart on the other side
async fn get_rates(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let cache = state.cache.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let aster = cache.load_snapshot(ExchangeId::Aster).await.map_err(|e| {
        error!(error = %e, "Failed to load aster snapshot");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let hyperliquid = cache
        .load_snapshot(ExchangeId::Hyperliquid)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load hyperliquid snapshot");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({
        "aster": aster,
        "hyperliquid": hyperliquid,
    })))
}

/// Closed-position history from QuestDB
async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Value>, StatusCode> {
    let db = state
        .database
        .as_ref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let limit = params.limit.unwrap_or(100).min(1000);
    let positions = db.get_closed_positions(limit).await.map_err(|e| {
        error!(error = %e, "Failed to load closed positions");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!(positions)))
}

/// Rebalance history from QuestDB
async fn get_rebalances(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Value>, StatusCode> {
    let db = state
        .database
        .as_ref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let limit = params.limit.unwrap_or(50).min(500);
    let rebalances = db.get_recent_rebalances(limit).await.map_err(|e| {
        error!(error = %e, "Failed to load rebalance history");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!(rebalances)))
}

/// Enqueue a manual rebalance. The worker enforces the cooldown.
async fn post_rebalance(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let storage = state
        .fetch_storage
        .as_ref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let mut storage = (**storage).clone();
    storage
        .push(FetchRatesJob {
            trigger: RebalanceTrigger::Manual,
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to enqueue manual rebalance");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({ "status": "queued" })))
}

/// Enqueue a manual close for one canonical asset
async fn post_close(
    State(state): State<AppState>,
    Path(canonical): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let storage = state
        .close_storage
        .as_ref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let mut storage = (**storage).clone();
    storage
        .push(ClosePositionJob {
            canonical: canonical.clone(),
        })
        .await
        .map_err(|e| {
            error!(error = %e, canonical = %canonical, "Failed to enqueue close");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({ "status": "queued", "canonical": canonical })))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/strategy/status", get(get_status))
        .route("/api/strategy/positions", get(get_positions))
        .route("/api/strategy/events", get(get_events))
        .route("/api/strategy/history", get(get_history))
        .route("/api/strategy/rebalances", get(get_rebalances))
        .route("/api/strategy/rebalance", post(post_rebalance))
        .route("/api/strategy/close/{canonical}", post(post_close))
        .route("/api/rates", get(get_rates))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port = port, "HTTP server listening on port {}", port);
    tracing::info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
