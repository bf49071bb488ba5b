//! Arbitrix Worker
//!
//! Owns the strategy service and processes rebalance jobs from the Redis
//! queue. Can be run as a separate process/instance from the API server.

use arbitrix::cache::RedisCache;
use arbitrix::config;
use arbitrix::core::runtime::StrategyRuntime;
use arbitrix::core::scheduler::RebalanceScheduler;
use arbitrix::core::service::StrategyService;
use arbitrix::db::StrategyStore;
use arbitrix::exchanges::{
    AsterClient, HyperliquidClient, PaperExchange, VenueHandle,
};
use arbitrix::jobs::context::JobContext;
use arbitrix::jobs::types::{ClosePositionJob, FetchRatesJob, PersistOutcomeJob, RebalanceJob};
use arbitrix::logging;
use arbitrix::metrics::Metrics;
use arbitrix::models::funding::ExchangeId;
use apalis_redis::RedisStorage;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Seed the paper venues so a dry run has spreads to trade. Rates are
/// picked so BTC/ETH/SOL clear a 10% APR threshold, shorting Aster.
async fn seed_paper_venues(aster: &PaperExchange, hyperliquid: &PaperExchange) {
    aster.set_rate("BTCUSDT", 0.000110, 65_000.0).await;
    aster.set_rate("ETHUSDT", 0.000160, 3_400.0).await;
    aster.set_rate("SOLUSDT", 0.000240, 150.0).await;
    hyperliquid.set_rate("BTC", 0.00000125, 65_000.0).await;
    hyperliquid.set_rate("ETH", 0.00000375, 3_400.0).await;
    hyperliquid.set_rate("SOL", 0.00000625, 150.0).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    // Initialize logging based on environment
    logging::init_logging();

    let env = config::get_environment();
    info!("Starting Arbitrix Worker");
    info!(environment = %env, "Environment");

    // Load and validate the strategy configuration
    let strategy_config = config::load_strategy_config()
        .map_err(|e| format!("Failed to load strategy config: {}", e))?;
    strategy_config
        .validate()
        .map_err(|e| format!("Invalid strategy config: {}", e))?;
    info!(
        capital = strategy_config.total_capital,
        pairs = strategy_config.number_of_pairs,
        interval = strategy_config.rebalance_interval_minutes,
        dry_run = strategy_config.dry_run,
        "Strategy: ${} across top {} spreads, rebalancing every {}m",
        strategy_config.total_capital,
        strategy_config.number_of_pairs,
        strategy_config.rebalance_interval_minutes
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new()?);

    // Initialize QuestDB (optional - history endpoints degrade without it)
    info!("Initializing QuestDB connection...");
    let database = match StrategyStore::new().await {
        Ok(db) => {
            info!("QuestDB connected");
            metrics.database_connected.set(1.0);
            Some(Arc::new(db))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to QuestDB - outcomes will not be persisted");
            None
        }
    };

    // Initialize Redis cache (for snapshots the api-server reads)
    info!("Initializing Redis connection...");
    let cache = match RedisCache::new().await {
        Ok(c) => {
            info!("Redis connected");
            metrics.cache_connected.set(1.0);
            Some(Arc::new(c))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis");
            warn!("Worker requires Redis for the job queue - exiting");
            return Err(format!("Redis connection required for worker: {}", e).into());
        }
    };

    // Build venue handles: paper venues in dry-run mode, REST clients
    // against the live venues otherwise.
    let venues: Vec<VenueHandle> = if strategy_config.dry_run {
        info!("Dry run: routing orders to paper venues");
        let aster = Arc::new(PaperExchange::new(ExchangeId::Aster));
        let hyperliquid = Arc::new(PaperExchange::new(ExchangeId::Hyperliquid));
        seed_paper_venues(&aster, &hyperliquid).await;
        vec![
            VenueHandle::from_client(ExchangeId::Aster, aster),
            VenueHandle::from_client(ExchangeId::Hyperliquid, hyperliquid),
        ]
    } else {
        let aster = match config::get_aster_base_url() {
            Some(url) => AsterClient::with_base_url(url),
            None => AsterClient::new(),
        };
        let mut hyperliquid = match config::get_hyperliquid_base_url() {
            Some(url) => HyperliquidClient::with_base_url(url),
            None => HyperliquidClient::new(),
        };
        if let Some(wallet) = strategy_config.wallet_addresses.get(&ExchangeId::Hyperliquid) {
            hyperliquid = hyperliquid.with_wallet(wallet.clone());
        }
        vec![
            VenueHandle::from_client(ExchangeId::Aster, Arc::new(aster)),
            VenueHandle::from_client(ExchangeId::Hyperliquid, Arc::new(hyperliquid)),
        ]
    };

    let rebalance_interval = strategy_config.rebalance_interval_minutes;

    // Create the strategy service and open the initial batch
    let service = Arc::new(
        StrategyService::new(strategy_config, venues, Some(metrics.clone()))
            .map_err(|e| format!("Failed to create strategy service: {}", e))?,
    );

    info!("Starting strategy...");
    let outcome = service
        .start()
        .await
        .map_err(|e| format!("Strategy start failed: {}", e))?;
    info!(
        selected = outcome.selected,
        opened = outcome.opened,
        "Initial batch: {} selected, {} opened",
        outcome.selected,
        outcome.opened
    );

    // Initialize Apalis storage backends
    info!("Initializing Apalis Redis storage...");
    let redis_url = config::get_redis_url();
    let conn = apalis_redis::connect(redis_url.clone()).await?;
    let fetch_storage: Arc<RedisStorage<FetchRatesJob>> =
        Arc::new(RedisStorage::new(conn.clone()));
    let rebalance_storage: Arc<RedisStorage<RebalanceJob>> =
        Arc::new(RedisStorage::new(conn.clone()));
    let persist_storage: Arc<RedisStorage<PersistOutcomeJob>> =
        Arc::new(RedisStorage::new(conn.clone()));
    let close_storage: Arc<RedisStorage<ClosePositionJob>> = Arc::new(RedisStorage::new(conn));
    info!("Apalis Redis storage initialized");

    // Create job context
    let job_context = Arc::new(JobContext::new(
        service.clone(),
        database.clone(),
        cache.clone(),
        Some(metrics.clone()),
    ));

    // Initialize and start job runtime (workers)
    info!("Starting Apalis workers...");
    let runtime = StrategyRuntime::new(
        job_context,
        fetch_storage.clone(),
        rebalance_storage.clone(),
        persist_storage.clone(),
        close_storage.clone(),
    );
    let worker_handles = runtime
        .start_workers()
        .await
        .map_err(|e| format!("Failed to start workers: {}", e))?;

    // Initialize and start scheduler
    info!("Starting rebalance scheduler...");
    let scheduler = RebalanceScheduler::new(fetch_storage, rebalance_interval)
        .map_err(|e| format!("Failed to create scheduler: {}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| format!("Failed to start scheduler: {}", e))?;

    // Graceful shutdown
    info!("Worker started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down worker...");
            scheduler.stop().await;
            match service.stop().await {
                Ok(closed) => {
                    info!(closed = closed.len(), "Strategy stopped, {} positions force-closed", closed.len());
                }
                Err(e) => {
                    warn!(error = %e, "Strategy stop reported errors");
                }
            }
            for handle in worker_handles {
                handle.abort();
            }
            info!("Worker stopped");
        }
    }

    Ok(())
}
