//! Delta-neutral strategy position model.

use crate::models::funding::ExchangeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position lifecycle. Entries that fail a leg never leave `Pending`;
/// a `Closing` position with a stuck leg stays `Closing` until manual
/// reconciliation resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Open,
    Closing,
    Closed,
}

/// Why a position was (or is being) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The oriented spread went negative: the arbitrage inverted.
    SpreadFlip,
    /// The annualized spread dropped under the configured threshold.
    BelowThreshold,
    /// Fell out of the top-N during a rebalance.
    RankEviction,
    /// User-requested close.
    Manual,
    /// Strategy-wide stop; closed regardless of spread.
    Shutdown,
}

/// One leg of a delta-neutral pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLeg {
    pub exchange: ExchangeId,
    pub symbol: String,
    /// USD notional at entry. Both legs carry the same notional so the
    /// pair is value-neutral regardless of relative leverage.
    pub size_usd: f64,
    /// Contract quantity actually placed.
    pub quantity: f64,
    pub entry_price: f64,
    /// Latest observed mark price, refreshed on each tick.
    pub mark_price: f64,
    /// Next funding settlement on this venue; funding accrues when a tick
    /// observes this deadline has passed.
    pub next_funding_time: Option<DateTime<Utc>>,
    /// Latest observed per-period rate on this venue.
    pub current_rate: f64,
    /// Set once this leg's closing order has filled. Lets a retried close
    /// skip legs that already unwound instead of doubling them.
    #[serde(default)]
    pub closed: bool,
}

/// An open (or historical) delta-neutral funding position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPosition {
    pub id: Uuid,
    pub canonical: String,
    /// Rank in the selection at the last rebalance (1-based).
    pub rank: usize,
    pub allocation_pct: f64,
    pub long: PositionLeg,
    pub short: PositionLeg,
    /// Oriented annualized spread at entry.
    pub entry_spread: f64,
    /// Oriented annualized spread as of the last tick.
    pub current_spread: f64,
    pub entry_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
    /// Net funding received minus paid, in USD.
    pub funding_earned: f64,
    /// Mark-to-market of both legs plus accrued funding, in USD.
    pub pnl: f64,
    pub status: PositionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl StrategyPosition {
    /// Total USD notional across both legs.
    pub fn notional_usd(&self) -> f64 {
        self.long.size_usd + self.short.size_usd
    }

    /// Recompute mark-to-market P&L from the legs' latest mark prices.
    ///
    /// Long leg gains when its mark rises, short leg gains when its mark
    /// falls; the two mostly cancel and funding carries the position.
    pub fn mark_to_market(&self) -> f64 {
        let long_move = if self.long.entry_price > 0.0 {
            self.long.size_usd * (self.long.mark_price / self.long.entry_price - 1.0)
        } else {
            0.0
        };
        let short_move = if self.short.entry_price > 0.0 {
            self.short.size_usd * (1.0 - self.short.mark_price / self.short.entry_price)
        } else {
            0.0
        };
        long_move + short_move + self.funding_earned
    }
}
