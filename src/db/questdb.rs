//! QuestDB persistence for closed positions, rebalance outcomes, and
//! strategy events.

use crate::config;
use crate::core::service::RebalanceOutcome;
use crate::models::event::StrategyEvent;
use crate::models::position::StrategyPosition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls};

pub struct StrategyStore {
    client: Arc<RwLock<Option<Client>>>,
}

/// Row shape served by the closed-position history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedPositionRow {
    pub closed_at: DateTime<Utc>,
    pub position_id: String,
    pub canonical: String,
    pub rank: i64,
    pub allocation_pct: f64,
    pub long_exchange: String,
    pub short_exchange: String,
    pub long_size_usd: f64,
    pub short_size_usd: f64,
    pub entry_spread: f64,
    pub exit_spread: f64,
    pub funding_earned: f64,
    pub pnl: f64,
    pub close_reason: String,
    pub entry_time: DateTime<Utc>,
}

/// Row shape served by the rebalance history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceRow {
    pub at: DateTime<Utc>,
    pub trigger: String,
    pub status: String,
    pub selected: i64,
    pub opened: i64,
    pub closed: i64,
    pub held: i64,
    pub duration_ms: i64,
    pub warnings: String,
}

impl StrategyStore {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let questdb_url = config::get_questdb_url();
        let (client, connection) = tokio_postgres::connect(&questdb_url, NoTls)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("Failed to connect to QuestDB: {}", e),
                )) as Box<dyn std::error::Error + Send + Sync>
            })?;

        // Spawn connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "QuestDB connection error");
            }
        });

        let store = Self {
            client: Arc::new(RwLock::new(Some(client))),
        };

        // Initialize schema
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            // QuestDB syntax: TIMESTAMP must be first, PARTITION BY comes after
            c.execute(
                "CREATE TABLE IF NOT EXISTS positions_closed (
                    timestamp TIMESTAMP,
                    position_id STRING,
                    canonical SYMBOL,
                    rank_pos LONG,
                    allocation_pct DOUBLE,
                    long_exchange SYMBOL,
                    short_exchange SYMBOL,
                    long_size_usd DOUBLE,
                    short_size_usd DOUBLE,
                    entry_spread DOUBLE,
                    exit_spread DOUBLE,
                    funding_earned DOUBLE,
                    pnl DOUBLE,
                    close_reason SYMBOL,
                    entry_time TIMESTAMP
                ) TIMESTAMP(timestamp) PARTITION BY DAY",
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to create positions_closed table: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            c.execute(
                "CREATE TABLE IF NOT EXISTS rebalances (
                    timestamp TIMESTAMP,
                    trigger_kind SYMBOL,
                    status SYMBOL,
                    selected LONG,
                    opened LONG,
                    closed LONG,
                    held LONG,
                    duration_ms LONG,
                    warnings STRING
                ) TIMESTAMP(timestamp) PARTITION BY DAY",
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to create rebalances table: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            c.execute(
                "CREATE TABLE IF NOT EXISTS strategy_events (
                    timestamp TIMESTAMP,
                    level SYMBOL,
                    kind SYMBOL,
                    canonical SYMBOL,
                    message STRING
                ) TIMESTAMP(timestamp) PARTITION BY DAY",
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to create strategy_events table: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        }

        Ok(())
    }

    /// Store a closed position in the history table.
    pub async fn store_closed_position(
        &self,
        position: &StrategyPosition,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let closed_at = position.exit_time.unwrap_or_else(Utc::now).naive_utc();
            let entry_time = position.entry_time.naive_utc();
            let close_reason = position
                .close_reason
                .map(|r| format!("{:?}", r))
                .unwrap_or_else(|| "unknown".to_string());

            c.execute(
                "INSERT INTO positions_closed (timestamp, position_id, canonical, rank_pos, allocation_pct, long_exchange, short_exchange, long_size_usd, short_size_usd, entry_spread, exit_spread, funding_earned, pnl, close_reason, entry_time)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
                &[
                    &closed_at,
                    &position.id.to_string(),
                    &position.canonical,
                    &(position.rank as i64),
                    &position.allocation_pct,
                    &position.long.exchange.to_string(),
                    &position.short.exchange.to_string(),
                    &position.long.size_usd,
                    &position.short.size_usd,
                    &position.entry_spread,
                    &position.current_spread,
                    &position.funding_earned,
                    &position.pnl,
                    &close_reason,
                    &entry_time,
                ],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to store closed position: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        }

        Ok(())
    }

    /// Store one rebalance outcome row.
    pub async fn store_rebalance(
        &self,
        outcome: &RebalanceOutcome,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let at = outcome.started_at.naive_utc();
            c.execute(
                "INSERT INTO rebalances (timestamp, trigger_kind, status, selected, opened, closed, held, duration_ms, warnings)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &at,
                    &format!("{:?}", outcome.trigger),
                    &format!("{:?}", outcome.status),
                    &(outcome.selected as i64),
                    &(outcome.opened as i64),
                    &(outcome.closed as i64),
                    &(outcome.held as i64),
                    &(outcome.duration_ms as i64),
                    &outcome.warnings.join("; "),
                ],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to store rebalance outcome: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        }

        Ok(())
    }

    /// Store one strategy event in the event log.
    pub async fn store_event(
        &self,
        event: &StrategyEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let at = event.timestamp.naive_utc();
            c.execute(
                "INSERT INTO strategy_events (timestamp, level, kind, canonical, message)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &at,
                    &format!("{:?}", event.level),
                    &format!("{:?}", event.kind),
                    &event.canonical.as_deref().unwrap_or("-"),
                    &event.message,
                ],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to store strategy event: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        }

        Ok(())
    }

    /// Closed-position history, newest first.
    pub async fn get_closed_positions(
        &self,
        limit: usize,
    ) -> Result<Vec<ClosedPositionRow>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let query = format!(
                "SELECT timestamp, position_id, canonical, rank_pos, allocation_pct, long_exchange, short_exchange, long_size_usd, short_size_usd, entry_spread, exit_spread, funding_earned, pnl, close_reason, entry_time
                 FROM positions_closed
                 ORDER BY timestamp DESC
                 LIMIT {}",
                limit
            );
            let rows = c.query(&query, &[]).await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to load closed positions: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            let mut positions = Vec::with_capacity(rows.len());
            for row in rows {
                let closed_at: chrono::NaiveDateTime = row.get(0);
                let entry_time: chrono::NaiveDateTime = row.get(14);
                positions.push(ClosedPositionRow {
                    closed_at: closed_at.and_utc(),
                    position_id: row.get(1),
                    canonical: row.get(2),
                    rank: row.get(3),
                    allocation_pct: row.get(4),
                    long_exchange: row.get(5),
                    short_exchange: row.get(6),
                    long_size_usd: row.get(7),
                    short_size_usd: row.get(8),
                    entry_spread: row.get(9),
                    exit_spread: row.get(10),
                    funding_earned: row.get(11),
                    pnl: row.get(12),
                    close_reason: row.get(13),
                    entry_time: entry_time.and_utc(),
                });
            }
            return Ok(positions);
        }

        Ok(Vec::new())
    }

    /// Recent rebalance outcomes, newest first.
    pub async fn get_recent_rebalances(
        &self,
        limit: usize,
    ) -> Result<Vec<RebalanceRow>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.read().await;
        if let Some(ref c) = *client {
            let query = format!(
                "SELECT timestamp, trigger_kind, status, selected, opened, closed, held, duration_ms, warnings
                 FROM rebalances
                 ORDER BY timestamp DESC
                 LIMIT {}",
                limit
            );
            let rows = c.query(&query, &[]).await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to load rebalance history: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

            let mut outcomes = Vec::with_capacity(rows.len());
            for row in rows {
                let at: chrono::NaiveDateTime = row.get(0);
                outcomes.push(RebalanceRow {
                    at: at.and_utc(),
                    trigger: row.get(1),
                    status: row.get(2),
                    selected: row.get(3),
                    opened: row.get(4),
                    closed: row.get(5),
                    held: row.get(6),
                    duration_ms: row.get(7),
                    warnings: row.get(8),
                });
            }
            return Ok(outcomes);
        }

        Ok(Vec::new())
    }
}
