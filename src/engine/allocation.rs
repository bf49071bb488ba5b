//! Capital allocation across ranked spreads.

use crate::models::error::EngineError;
use crate::models::strategy::{StrategyConfig, ALLOCATION_SUM_TOLERANCE};
use serde::{Deserialize, Serialize};

/// Sizing for one selected rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankAllocation {
    /// 1-based rank in the selection.
    pub rank: usize,
    /// Effective percentage after any redistribution.
    pub pct: f64,
    /// Total USD notional for this rank.
    pub notional_usd: f64,
    /// USD notional per leg: both legs equal so the pair is
    /// value-neutral at entry.
    pub leg_usd: f64,
}

/// Maps the capital budget and per-rank percentage table onto position
/// sizes.
pub struct AllocationEngine {
    total_capital: f64,
    allocations: Vec<f64>,
}

impl AllocationEngine {
    /// Build from config, validating the percentage table first.
    pub fn from_config(config: &StrategyConfig) -> Result<Self, EngineError> {
        Self::new(config.total_capital, config.allocations.clone())
    }

    pub fn new(total_capital: f64, allocations: Vec<f64>) -> Result<Self, EngineError> {
        if !total_capital.is_finite() || total_capital <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "total capital must be positive, got {}",
                total_capital
            )));
        }
        let sum: f64 = allocations.iter().sum();
        if (sum - 100.0).abs() > ALLOCATION_SUM_TOLERANCE {
            return Err(EngineError::Configuration(format!(
                "allocations must sum to 100%, got {:.4}%",
                sum
            )));
        }
        Ok(Self {
            total_capital,
            allocations,
        })
    }

    /// Size the top `count` ranks.
    ///
    /// When fewer spreads qualify than the table has entries, the leading
    /// percentages are renormalized to sum to 100: the freed-up share is
    /// redistributed proportionally instead of leaving capital idle.
    /// Aggregate notional never exceeds the capital budget.
    pub fn size(&self, count: usize) -> Vec<RankAllocation> {
        let count = count.min(self.allocations.len());
        if count == 0 {
            return Vec::new();
        }

        let used: &[f64] = &self.allocations[..count];
        let used_sum: f64 = used.iter().sum();
        if used_sum <= 0.0 {
            return Vec::new();
        }

        used.iter()
            .enumerate()
            .map(|(i, pct)| {
                let effective_pct = pct * 100.0 / used_sum;
                let notional = self.total_capital * effective_pct / 100.0;
                RankAllocation {
                    rank: i + 1,
                    pct: effective_pct,
                    notional_usd: notional,
                    leg_usd: notional / 2.0,
                }
            })
            .collect()
    }

    pub fn total_capital(&self) -> f64 {
        self.total_capital
    }
}
