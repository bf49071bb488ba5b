//! Cron-based scheduler for enqueuing rebalance cycles

use crate::core::service::RebalanceTrigger;
use crate::jobs::types::FetchRatesJob;
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Scheduler that periodically enqueues a FetchRatesJob, kicking off one
/// rebalance cycle per tick.
pub struct RebalanceScheduler {
    storage: Arc<RedisStorage<FetchRatesJob>>,
    schedule: Schedule,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl RebalanceScheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `storage` - Redis storage backend for jobs
    /// * `interval_minutes` - Rebalance interval in minutes (0 = disabled)
    pub fn new(
        storage: Arc<RedisStorage<FetchRatesJob>>,
        interval_minutes: u64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if interval_minutes == 0 {
            return Err("Scheduler disabled: interval_minutes is 0".into());
        }

        // Convert interval to cron expression: every N minutes
        // Cron format: second minute hour day month weekday
        let cron_expr = if interval_minutes >= 60 {
            // For intervals >= 60 minutes, use hour-based cron
            let hours = interval_minutes / 60;
            format!("0 0 */{} * * *", hours)
        } else {
            // For intervals < 60 minutes, use minute-based cron
            format!("0 */{} * * * *", interval_minutes)
        };

        let schedule = Schedule::from_str(&cron_expr).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid cron expression '{}': {}", cron_expr, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!(
            interval = interval_minutes,
            cron = %cron_expr,
            "RebalanceScheduler: created with interval {}m (cron: {})",
            interval_minutes,
            cron_expr
        );

        Ok(Self {
            storage,
            schedule,
            handle: Arc::new(RwLock::new(None)),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let storage = self.storage.clone();
        let schedule = self.schedule.clone();
        let handle_arc = self.handle.clone();

        let handle = tokio::spawn(async move {
            info!("RebalanceScheduler: started, waiting for cron schedule...");

            loop {
                // Get the next scheduled time
                let mut upcoming = schedule.upcoming(chrono::Utc);
                if let Some(next_tick) = upcoming.next() {
                    let now = chrono::Utc::now();
                    if next_tick > now {
                        let duration = (next_tick - now).to_std().unwrap_or_default();
                        tokio::time::sleep(duration).await;
                    }
                } else {
                    // No more scheduled times, wait a bit and check again
                    tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                    continue;
                }

                info!("RebalanceScheduler: cron tick, enqueuing FetchRatesJob");

                let job = FetchRatesJob {
                    trigger: RebalanceTrigger::Timer,
                };

                let mut storage_clone = (*storage).clone();
                match storage_clone.push(job).await {
                    Ok(_) => {
                        debug!("RebalanceScheduler: enqueued FetchRatesJob");
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            "RebalanceScheduler: failed to enqueue FetchRatesJob"
                        );
                    }
                }
            }
        });

        {
            let mut h = handle_arc.write().await;
            *h = Some(handle);
        }

        info!("RebalanceScheduler: started successfully");
        Ok(())
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut handle = self.handle.write().await;
        if let Some(h) = handle.take() {
            h.abort();
            info!("RebalanceScheduler: stopped");
        }
    }

    /// Check if the scheduler is running
    pub async fn is_running(&self) -> bool {
        let handle = self.handle.read().await;
        handle.is_some()
    }
}
