//! Eligibility filtering and top-N ranking of funding spreads.

use crate::models::error::EngineError;
use crate::models::funding::{AssetMeta, FundingSpread};
use crate::models::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Why a candidate was filtered out. Reported, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub canonical: String,
    pub reason: String,
}

/// Outcome of a selection pass. A shortfall (fewer qualifying spreads
/// than configured pairs) is a warning for the caller to surface, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    pub selected: Vec<FundingSpread>,
    pub skipped: Vec<SkippedCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall_warning: Option<String>,
}

/// Ranks candidate spreads by absolute annualized spread and applies the
/// configured eligibility filters.
pub struct RankedSelector {
    min_annual_spread: f64,
    min_market_cap_usd: Option<f64>,
    min_liquidity_usd: Option<f64>,
    min_average_apr: Option<f64>,
    excluded: Vec<String>,
    number_of_pairs: usize,
}

impl RankedSelector {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            min_annual_spread: config.min_spread_threshold(),
            min_market_cap_usd: config.min_market_cap_usd,
            min_liquidity_usd: config.min_liquidity_usd,
            min_average_apr: config.min_average_apr(),
            excluded: config.excluded_symbols.clone(),
            number_of_pairs: config.number_of_pairs,
        }
    }

    /// Filter, sort descending by `abs(annual_spread)`, take the top N.
    ///
    /// The sort is stable: candidates with equal spreads keep their input
    /// order. `meta` is keyed by canonical asset; a candidate missing
    /// metadata fails a metadata filter only when that filter is set.
    pub fn select(
        &self,
        candidates: Vec<FundingSpread>,
        meta: &HashMap<String, AssetMeta>,
    ) -> SelectionReport {
        let total = candidates.len();
        let mut skipped = Vec::new();
        let mut eligible: Vec<FundingSpread> = Vec::new();

        for spread in candidates {
            match self.eligibility_failure(&spread, meta) {
                Some(reason) => {
                    let failure = EngineError::Eligibility {
                        canonical: spread.canonical.clone(),
                        reason: reason.clone(),
                    };
                    debug!(canonical = %spread.canonical, "RankedSelector: {}", failure);
                    skipped.push(SkippedCandidate {
                        canonical: spread.canonical.clone(),
                        reason,
                    });
                }
                None => eligible.push(spread),
            }
        }

        eligible.sort_by(|a, b| {
            b.annual_spread_abs()
                .partial_cmp(&a.annual_spread_abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let qualifying = eligible.len();
        let selected: Vec<FundingSpread> =
            eligible.into_iter().take(self.number_of_pairs).collect();

        let shortfall_warning = if qualifying < self.number_of_pairs {
            Some(format!(
                "only {} of {} configured pairs qualify ({} of {} candidates filtered out)",
                qualifying,
                self.number_of_pairs,
                total - qualifying,
                total
            ))
        } else {
            None
        };

        SelectionReport {
            selected,
            skipped,
            shortfall_warning,
        }
    }

    fn eligibility_failure(
        &self,
        spread: &FundingSpread,
        meta: &HashMap<String, AssetMeta>,
    ) -> Option<String> {
        if self.excluded.iter().any(|s| s == &spread.canonical) {
            return Some("excluded by configuration".to_string());
        }

        let apr = spread.annual_spread_abs();
        if apr < self.min_annual_spread {
            return Some(format!(
                "annual spread {:.2}% below threshold {:.2}%",
                apr * 100.0,
                self.min_annual_spread * 100.0
            ));
        }

        if let Some(min_avg) = self.min_average_apr {
            let avg = spread.average_apr();
            if avg < min_avg {
                return Some(format!(
                    "average APR {:.2}% below minimum {:.2}%",
                    avg * 100.0,
                    min_avg * 100.0
                ));
            }
        }

        let asset_meta = meta.get(&spread.canonical);

        if let Some(min_cap) = self.min_market_cap_usd {
            match asset_meta.and_then(|m| m.market_cap_usd) {
                Some(cap) if cap >= min_cap => {}
                Some(cap) => {
                    return Some(format!(
                        "market cap ${:.0} below minimum ${:.0}",
                        cap, min_cap
                    ))
                }
                None => return Some("market cap unavailable".to_string()),
            }
        }

        if let Some(min_liquidity) = self.min_liquidity_usd {
            match asset_meta.and_then(|m| m.day_volume_usd) {
                Some(volume) if volume >= min_liquidity => {}
                Some(volume) => {
                    return Some(format!(
                        "24h volume ${:.0} below minimum ${:.0}",
                        volume, min_liquidity
                    ))
                }
                None => return Some("liquidity data unavailable".to_string()),
            }
        }

        None
    }
}
