//! Job handlers for the rebalance workflow

use crate::jobs::context::JobContext;
use crate::jobs::types::{ClosePositionJob, FetchRatesJob, PersistOutcomeJob, RebalanceJob};
use apalis::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler for fetching funding snapshots
///
/// Pulls fresh snapshots from both venue feeds, caches them for the
/// api-server, and enqueues the rebalance stage.
pub async fn handle_fetch_rates(
    job: FetchRatesJob,
    ctx: Data<Arc<JobContext>>,
    rebalance_storage: Data<apalis_redis::RedisStorage<RebalanceJob>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!(trigger = ?job.trigger, "FetchRatesJob: fetching funding snapshots");

    let snapshots = ctx.service.refresh_snapshots().await.map_err(|e| {
        Box::new(std::io::Error::other(format!(
            "Funding snapshot fetch failed: {}",
            e
        ))) as Box<dyn std::error::Error + Send + Sync>
    })?;

    if let Some(ref cache) = ctx.cache {
        for snapshot in snapshots.values() {
            if let Err(e) = cache.store_snapshot(snapshot).await {
                warn!(
                    exchange = %snapshot.exchange,
                    error = %e,
                    "FetchRatesJob: failed to cache snapshot for {}",
                    snapshot.exchange
                );
            }
        }
    }

    let next_job = RebalanceJob {
        trigger: job.trigger,
        snapshots: snapshots.into_values().collect(),
    };
    let mut storage = (*rebalance_storage).clone();
    storage.push(next_job).await.map_err(|e| {
        Box::new(std::io::Error::other(format!(
            "Failed to enqueue RebalanceJob: {}",
            e
        ))) as Box<dyn std::error::Error + Send + Sync>
    })?;

    debug!(trigger = ?job.trigger, "FetchRatesJob: enqueued RebalanceJob");
    Ok(())
}

/// Handler for the rebalance stage
///
/// Runs one evaluation cycle on the strategy service, refreshes the
/// cached status snapshot, and enqueues persistence of the outcome.
pub async fn handle_rebalance(
    job: RebalanceJob,
    ctx: Data<Arc<JobContext>>,
    persist_storage: Data<apalis_redis::RedisStorage<PersistOutcomeJob>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!(
        trigger = ?job.trigger,
        venues = job.snapshots.len(),
        "RebalanceJob: evaluating with {} venue snapshots",
        job.snapshots.len()
    );

    let snapshots: HashMap<_, _> = job
        .snapshots
        .into_iter()
        .map(|s| (s.exchange, s))
        .collect();

    let outcome = ctx
        .service
        .rebalance_with(job.trigger, &snapshots)
        .await
        .map_err(|e| {
            Box::new(std::io::Error::other(format!("Rebalance failed: {}", e)))
                as Box<dyn std::error::Error + Send + Sync>
        })?;

    info!(
        trigger = ?outcome.trigger,
        status = ?outcome.status,
        selected = outcome.selected,
        opened = outcome.opened,
        closed = outcome.closed,
        held = outcome.held,
        "RebalanceJob: cycle finished ({} opened, {} closed, {} held)",
        outcome.opened,
        outcome.closed,
        outcome.held
    );

    if let Some(ref cache) = ctx.cache {
        let status = ctx.service.status().await;
        if let Err(e) = cache.store_status(&status).await {
            warn!(error = %e, "RebalanceJob: failed to cache status snapshot");
        }
    }

    let next_job = PersistOutcomeJob {
        outcome,
        events: ctx.service.drain_pending_events(),
    };
    let mut storage = (*persist_storage).clone();
    storage.push(next_job).await.map_err(|e| {
        Box::new(std::io::Error::other(format!(
            "Failed to enqueue PersistOutcomeJob: {}",
            e
        ))) as Box<dyn std::error::Error + Send + Sync>
    })?;

    Ok(())
}

/// Handler for persisting a rebalance outcome
///
/// Stores the outcome row, any closed positions, and the buffered events.
/// This is the final step in the workflow.
pub async fn handle_persist_outcome(
    job: PersistOutcomeJob,
    ctx: Data<Arc<JobContext>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(ref db) = ctx.database else {
        debug!("PersistOutcomeJob: no database available, skipping persistence");
        return Ok(());
    };

    if let Err(e) = db.store_rebalance(&job.outcome).await {
        warn!(error = %e, "PersistOutcomeJob: failed to store rebalance outcome");
    }

    for position in &job.outcome.closed_positions {
        if let Err(e) = db.store_closed_position(position).await {
            warn!(
                canonical = %position.canonical,
                error = %e,
                "PersistOutcomeJob: failed to store closed position for {}",
                position.canonical
            );
        }
    }

    for event in &job.events {
        if let Err(e) = db.store_event(event).await {
            warn!(error = %e, "PersistOutcomeJob: failed to store event");
        }
    }

    debug!(
        closed = job.outcome.closed_positions.len(),
        events = job.events.len(),
        "PersistOutcomeJob: persisted outcome with {} closed positions and {} events",
        job.outcome.closed_positions.len(),
        job.events.len()
    );

    Ok(())
}

/// Handler for manual position closes
pub async fn handle_close_position(
    job: ClosePositionJob,
    ctx: Data<Arc<JobContext>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(canonical = %job.canonical, "ClosePositionJob: closing {}", job.canonical);

    let closed = ctx
        .service
        .close_by_canonical(&job.canonical)
        .await
        .map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Manual close of {} failed: {}",
                job.canonical, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;

    match closed {
        Some(position) => {
            if let Some(ref db) = ctx.database {
                if let Err(e) = db.store_closed_position(&position).await {
                    warn!(
                        canonical = %position.canonical,
                        error = %e,
                        "ClosePositionJob: failed to store closed position"
                    );
                }
                for event in ctx.service.drain_pending_events() {
                    if let Err(e) = db.store_event(&event).await {
                        warn!(error = %e, "ClosePositionJob: failed to store event");
                    }
                }
            }
        }
        None => {
            warn!(
                canonical = %job.canonical,
                "ClosePositionJob: no open position for {}",
                job.canonical
            );
        }
    }

    if let Some(ref cache) = ctx.cache {
        let status = ctx.service.status().await;
        if let Err(e) = cache.store_status(&status).await {
            warn!(error = %e, "ClosePositionJob: failed to cache status snapshot");
        }
    }

    Ok(())
}
