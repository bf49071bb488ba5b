//! Redis cache for funding snapshots and the status snapshot.
//!
//! The worker writes here after every fetch and rebalance; the stateless
//! api-server serves reads from here without ever touching the strategy
//! service.

use crate::config;
use crate::core::service::StatusSnapshot;
use crate::models::funding::{ExchangeId, VenueSnapshot};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Snapshots older than this are considered stale and expire.
const SNAPSHOT_TTL_SECS: u64 = 900;

pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let redis_url = config::get_redis_url();
        let client = redis::Client::open(redis_url).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid Redis URL: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("failed to connect to Redis: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(Self { manager })
    }

    fn rates_key(exchange: ExchangeId) -> String {
        format!("arbitrix:rates:{}", exchange)
    }

    const STATUS_KEY: &'static str = "arbitrix:status";

    pub async fn store_snapshot(
        &self,
        snapshot: &VenueSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(Self::rates_key(snapshot.exchange), json, SNAPSHOT_TTL_SECS)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "failed to cache snapshot for {}: {}",
                    snapshot.exchange, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })
    }

    pub async fn load_snapshot(
        &self,
        exchange: ExchangeId,
    ) -> Result<Option<VenueSnapshot>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::rates_key(exchange)).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "failed to read cached snapshot for {}: {}",
                exchange, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn store_status(
        &self,
        status: &StatusSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(status)?;
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(Self::STATUS_KEY, json).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "failed to cache status snapshot: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })
    }

    pub async fn load_status(
        &self,
    ) -> Result<Option<StatusSnapshot>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::STATUS_KEY).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "failed to read cached status snapshot: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
