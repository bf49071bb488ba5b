//! Strategy configuration model and validation.

use crate::models::error::EngineError;
use crate::models::funding::{AssetMapping, ExchangeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tolerance when checking the allocation table sums to 100%.
pub const ALLOCATION_SUM_TOLERANCE: f64 = 0.01;

/// Basis for the spread exit check on open positions.
///
/// The per-period sign and the annualized sign always agree; the modes
/// differ in how aggressively a weakening-but-still-positive spread is
/// evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadExitMode {
    /// Close only once the oriented spread goes negative.
    SignFlip,
    /// Close as soon as the oriented annualized spread drops under the
    /// entry threshold.
    BelowThreshold,
}

impl Default for SpreadExitMode {
    fn default() -> Self {
        SpreadExitMode::SignFlip
    }
}

/// Immutable strategy configuration snapshot.
///
/// Owned by the caller (API / config file); passed by value into the
/// service on start or update. The service clones what it keeps and never
/// mutates the caller's copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Capital budget in USD deployed across all selected spreads.
    pub total_capital: f64,
    /// Number of top-ranked spreads to hold.
    pub number_of_pairs: usize,
    /// Per-rank allocation percentages. Must sum to 100 ± 0.01.
    pub allocations: Vec<f64>,
    /// Minutes between scheduled rebalances.
    pub rebalance_interval_minutes: u64,
    /// Minimum annualized spread (percent, e.g. 50.0 = 50% APR) for a
    /// candidate to qualify.
    pub min_spread_threshold_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_market_cap_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_liquidity_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_average_apr_pct: Option<f64>,
    /// Canonical symbols excluded from selection.
    #[serde(default)]
    pub excluded_symbols: Vec<String>,
    /// Wallet address per venue, used for balance queries.
    #[serde(default)]
    pub wallet_addresses: HashMap<ExchangeId, String>,
    /// Curated canonical-to-venue symbol mappings.
    pub mappings: Vec<AssetMapping>,
    #[serde(default)]
    pub exit_mode: SpreadExitMode,
    /// Cooldown window between manual rebalances, in seconds.
    #[serde(default = "default_manual_cooldown_secs")]
    pub manual_cooldown_secs: u64,
    /// When set, orders route to the paper venue instead of live venues.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_manual_cooldown_secs() -> u64 {
    60
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            total_capital: 1_000.0,
            number_of_pairs: 5,
            allocations: vec![30.0, 30.0, 20.0, 10.0, 10.0],
            rebalance_interval_minutes: 60,
            min_spread_threshold_pct: 10.0,
            min_market_cap_usd: None,
            min_liquidity_usd: None,
            min_average_apr_pct: None,
            excluded_symbols: Vec::new(),
            wallet_addresses: HashMap::new(),
            mappings: default_mappings(),
            exit_mode: SpreadExitMode::default(),
            manual_cooldown_secs: default_manual_cooldown_secs(),
            dry_run: true,
        }
    }
}

/// Starter mapping set for the majors. Real deployments extend this from
/// the config file.
fn default_mappings() -> Vec<AssetMapping> {
    vec![
        AssetMapping::new("BTC", "BTCUSDT", "BTC"),
        AssetMapping::new("ETH", "ETHUSDT", "ETH"),
        AssetMapping::new("SOL", "SOLUSDT", "SOL"),
        AssetMapping::new("DOGE", "DOGEUSDT", "DOGE"),
        AssetMapping::new("PEPE", "1000PEPEUSDT", "kPEPE").with_multiplier(1000.0),
    ]
}

impl StrategyConfig {
    /// Validate the configuration. Every path that deploys capital goes
    /// through this first.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.total_capital.is_finite() || self.total_capital <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "total capital must be positive, got {}",
                self.total_capital
            )));
        }
        if self.number_of_pairs == 0 {
            return Err(EngineError::Configuration(
                "number of pairs must be at least 1".to_string(),
            ));
        }
        if self.allocations.len() < self.number_of_pairs {
            return Err(EngineError::Configuration(format!(
                "allocation table has {} entries for {} pairs",
                self.allocations.len(),
                self.number_of_pairs
            )));
        }
        if self.allocations.iter().any(|pct| !pct.is_finite() || *pct <= 0.0) {
            return Err(EngineError::Configuration(
                "allocation percentages must all be positive".to_string(),
            ));
        }
        let sum: f64 = self.allocations.iter().sum();
        if (sum - 100.0).abs() > ALLOCATION_SUM_TOLERANCE {
            return Err(EngineError::Configuration(format!(
                "allocations must sum to 100%, got {:.4}%",
                sum
            )));
        }
        if self.rebalance_interval_minutes == 0 {
            return Err(EngineError::Configuration(
                "rebalance interval must be at least 1 minute".to_string(),
            ));
        }
        if self.mappings.is_empty() {
            return Err(EngineError::Configuration(
                "at least one asset mapping is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up the mapping for a canonical asset.
    pub fn mapping(&self, canonical: &str) -> Option<&AssetMapping> {
        self.mappings.iter().find(|m| m.canonical == canonical)
    }

    /// Minimum annualized spread as a fraction (50% -> 0.5).
    pub fn min_spread_threshold(&self) -> f64 {
        self.min_spread_threshold_pct / 100.0
    }

    /// Minimum average APR as a fraction, when configured.
    pub fn min_average_apr(&self) -> Option<f64> {
        self.min_average_apr_pct.map(|pct| pct / 100.0)
    }
}
