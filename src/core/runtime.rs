//! Apalis worker setup for the rebalance workflow

use crate::jobs::context::JobContext;
use crate::jobs::handlers;
use crate::jobs::types::{ClosePositionJob, FetchRatesJob, PersistOutcomeJob, RebalanceJob};
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use std::sync::Arc;
use tracing::info;

/// Strategy runtime that sets up Apalis workers
pub struct StrategyRuntime {
    job_context: Arc<JobContext>,
    fetch_storage: Arc<RedisStorage<FetchRatesJob>>,
    rebalance_storage: Arc<RedisStorage<RebalanceJob>>,
    persist_storage: Arc<RedisStorage<PersistOutcomeJob>>,
    close_storage: Arc<RedisStorage<ClosePositionJob>>,
}

impl StrategyRuntime {
    /// Create a new runtime with job context and storage backends
    pub fn new(
        job_context: Arc<JobContext>,
        fetch_storage: Arc<RedisStorage<FetchRatesJob>>,
        rebalance_storage: Arc<RedisStorage<RebalanceJob>>,
        persist_storage: Arc<RedisStorage<PersistOutcomeJob>>,
        close_storage: Arc<RedisStorage<ClosePositionJob>>,
    ) -> Self {
        Self {
            job_context,
            fetch_storage,
            rebalance_storage,
            persist_storage,
            close_storage,
        }
    }

    /// Start all workers and return handles for graceful shutdown
    pub async fn start_workers(
        &self,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>, Box<dyn std::error::Error + Send + Sync>> {
        let mut handles = Vec::new();

        info!("StrategyRuntime: starting Apalis workers");

        // Worker for FetchRatesJob
        let fetch_storage = (*self.fetch_storage).clone();
        let rebalance_storage = self.rebalance_storage.clone();
        let job_context = self.job_context.clone();
        let fetch_handle = tokio::spawn(async move {
            let worker = WorkerBuilder::new("fetch-rates-worker")
                .data(job_context.clone())
                .data((*rebalance_storage).clone())
                .backend(fetch_storage)
                .build_fn(handlers::handle_fetch_rates);

            info!("StrategyRuntime: FetchRatesJob worker started");
            worker.run().await;
        });
        handles.push(fetch_handle);

        // Worker for RebalanceJob. The service's own guard also rejects
        // overlap, but a single worker keeps cycles strictly serialized.
        let rebalance_storage_worker = (*self.rebalance_storage).clone();
        let persist_storage = self.persist_storage.clone();
        let job_context_rebalance = self.job_context.clone();
        let rebalance_handle = tokio::spawn(async move {
            let worker = WorkerBuilder::new("rebalance-worker")
                .data(job_context_rebalance.clone())
                .data((*persist_storage).clone())
                .backend(rebalance_storage_worker)
                .build_fn(handlers::handle_rebalance);

            info!("StrategyRuntime: RebalanceJob worker started");
            worker.run().await;
        });
        handles.push(rebalance_handle);

        // Worker for PersistOutcomeJob
        let persist_storage_worker = (*self.persist_storage).clone();
        let job_context_persist = self.job_context.clone();
        let persist_handle = tokio::spawn(async move {
            let worker = WorkerBuilder::new("persist-outcome-worker")
                .data(job_context_persist.clone())
                .backend(persist_storage_worker)
                .build_fn(handlers::handle_persist_outcome);

            info!("StrategyRuntime: PersistOutcomeJob worker started");
            worker.run().await;
        });
        handles.push(persist_handle);

        // Worker for ClosePositionJob
        let close_storage_worker = (*self.close_storage).clone();
        let job_context_close = self.job_context.clone();
        let close_handle = tokio::spawn(async move {
            let worker = WorkerBuilder::new("close-position-worker")
                .data(job_context_close.clone())
                .backend(close_storage_worker)
                .build_fn(handlers::handle_close_position);

            info!("StrategyRuntime: ClosePositionJob worker started");
            worker.run().await;
        });
        handles.push(close_handle);

        info!("StrategyRuntime: all workers started");
        Ok(handles)
    }
}
