//! Job context for dependency injection

use crate::cache::RedisCache;
use crate::core::service::StrategyService;
use crate::db::StrategyStore;
use crate::metrics::Metrics;
use std::sync::Arc;

/// Context passed to job handlers via Apalis Data<T> pattern
///
/// Contains:
/// - The strategy service (single owner of position state)
/// - Database (for persisting outcomes and events)
/// - Cache (for the snapshots the api-server reads)
/// - Metrics
pub struct JobContext {
    pub service: Arc<StrategyService>,
    pub database: Option<Arc<StrategyStore>>,
    pub cache: Option<Arc<RedisCache>>,
    pub metrics: Option<Arc<Metrics>>,
}

impl JobContext {
    pub fn new(
        service: Arc<StrategyService>,
        database: Option<Arc<StrategyStore>>,
        cache: Option<Arc<RedisCache>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            service,
            database,
            cache,
            metrics,
        }
    }
}
