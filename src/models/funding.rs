//! Funding-rate domain types shared across the engine layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Days per year used for annualizing per-period funding rates.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// The two perpetual venues the engine arbitrages between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Aster,
    Hyperliquid,
}

impl ExchangeId {
    /// Funding payments per day on this venue.
    ///
    /// Aster settles every 8 hours, Hyperliquid every hour. Annualization
    /// must account for the difference or cross-venue spreads are
    /// meaningless.
    pub fn payments_per_day(&self) -> f64 {
        match self {
            ExchangeId::Aster => 3.0,
            ExchangeId::Hyperliquid => 24.0,
        }
    }

    /// Funding period length in hours.
    pub fn funding_period_hours(&self) -> u32 {
        match self {
            ExchangeId::Aster => 8,
            ExchangeId::Hyperliquid => 1,
        }
    }

    /// Scale a per-period rate to an annual rate.
    pub fn annualize(&self, rate: f64) -> f64 {
        rate * self.payments_per_day() * DAYS_PER_YEAR
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeId::Aster => write!(f, "aster"),
            ExchangeId::Hyperliquid => write!(f, "hyperliquid"),
        }
    }
}

/// Latest observed funding state for one symbol on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub exchange: ExchangeId,
    pub symbol: String,
    /// Per-period rate as a fraction (0.0001 = 0.01% per period).
    pub rate: f64,
    pub mark_price: f64,
    pub next_funding_time: Option<DateTime<Utc>>,
}

impl FundingRate {
    pub fn new(exchange: ExchangeId, symbol: impl Into<String>, rate: f64, mark_price: f64) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            rate,
            mark_price,
            next_funding_time: None,
        }
    }

    pub fn with_next_funding_time(mut self, at: DateTime<Utc>) -> Self {
        self.next_funding_time = Some(at);
        self
    }

    /// Annualized rate for this venue's payment frequency.
    pub fn annual_rate(&self) -> f64 {
        self.exchange.annualize(self.rate)
    }
}

/// Optional per-asset venue metadata used by eligibility filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetMeta {
    /// Market cap in USD, when the venue exposes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_usd: Option<f64>,
    /// 24h notional volume in USD, used as the liquidity proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_volume_usd: Option<f64>,
}

/// One venue's full funding snapshot: latest rate per symbol plus
/// whatever eligibility metadata the venue exposes.
///
/// Snapshots are read-once inputs to an evaluation cycle. They are
/// serializable because the worker passes them through the job queue
/// between the fetch and rebalance stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSnapshot {
    pub exchange: ExchangeId,
    pub taken_at: DateTime<Utc>,
    pub rates: HashMap<String, FundingRate>,
    #[serde(default)]
    pub meta: HashMap<String, AssetMeta>,
}

impl VenueSnapshot {
    pub fn new(exchange: ExchangeId, taken_at: DateTime<Utc>) -> Self {
        Self {
            exchange,
            taken_at,
            rates: HashMap::new(),
            meta: HashMap::new(),
        }
    }

    pub fn insert(&mut self, rate: FundingRate) {
        self.rates.insert(rate.symbol.clone(), rate);
    }

    pub fn rate(&self, symbol: &str) -> Option<&FundingRate> {
        self.rates.get(symbol)
    }
}

/// Manual mapping from a canonical asset to its per-venue trading symbols.
///
/// Symbol spellings diverge across venues ("1000PEPEUSDT" vs "kPEPE"), so
/// mappings are curated by hand: there is no automatic matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMapping {
    pub canonical: String,
    pub aster_symbol: String,
    pub hyperliquid_symbol: String,
    /// Contract-unit multiplier between venues (1000 for kPEPE-style
    /// wrapped symbols). Mark prices divided by this are comparable in
    /// canonical units.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl AssetMapping {
    pub fn new(
        canonical: impl Into<String>,
        aster_symbol: impl Into<String>,
        hyperliquid_symbol: impl Into<String>,
    ) -> Self {
        Self {
            canonical: canonical.into(),
            aster_symbol: aster_symbol.into(),
            hyperliquid_symbol: hyperliquid_symbol.into(),
            multiplier: 1.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// The trading symbol for this asset on the given venue.
    pub fn symbol_on(&self, exchange: ExchangeId) -> &str {
        match exchange {
            ExchangeId::Aster => &self.aster_symbol,
            ExchangeId::Hyperliquid => &self.hyperliquid_symbol,
        }
    }
}

/// A cross-venue funding spread for one fully-mapped asset.
///
/// Derived data: recomputed from fresh [`VenueSnapshot`]s on every
/// evaluation cycle, never mutated in place or persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSpread {
    pub canonical: String,
    /// Venue paying the lower rate: the leg to go long.
    pub long_exchange: ExchangeId,
    /// Venue paying the higher rate: the leg to short.
    pub short_exchange: ExchangeId,
    /// Per-period rate on the long venue.
    pub long_rate: f64,
    /// Per-period rate on the short venue.
    pub short_rate: f64,
    /// Raw per-period spread, first venue minus second venue as supplied
    /// to the calculator. Sign encodes direction; flips when the venue
    /// inputs are swapped.
    pub spread: f64,
    /// Annualized spread with each side scaled by its own payment
    /// frequency. Same sign convention as `spread`.
    pub annual_spread: f64,
    pub long_mark_price: f64,
    pub short_mark_price: f64,
}

impl FundingSpread {
    /// Magnitude of the annualized spread: the ranking key.
    pub fn annual_spread_abs(&self) -> f64 {
        self.annual_spread.abs()
    }

    /// Annualized carry of the oriented trade (short leg receives, long
    /// leg pays). Non-negative for any spread produced by the calculator.
    pub fn oriented_annual_spread(&self) -> f64 {
        self.short_exchange.annualize(self.short_rate) - self.long_exchange.annualize(self.long_rate)
    }

    /// Average of the two venues' absolute annual rates. Some operators
    /// filter on this rather than the spread itself.
    pub fn average_apr(&self) -> f64 {
        (self.long_exchange.annualize(self.long_rate).abs()
            + self.short_exchange.annualize(self.short_rate).abs())
            / 2.0
    }
}
