//! Rebalance planning: diffing open positions against a fresh selection.

use crate::engine::allocation::RankAllocation;
use crate::models::funding::FundingSpread;
use crate::models::position::{CloseReason, PositionStatus, StrategyPosition};
use crate::models::strategy::SpreadExitMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseDirective {
    pub position_id: Uuid,
    pub canonical: String,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDirective {
    pub spread: FundingSpread,
    pub rank: usize,
    pub allocation: RankAllocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldDirective {
    pub position_id: Uuid,
    pub canonical: String,
    /// Rank in the fresh selection; may differ from the entry rank.
    pub rank: usize,
}

/// The actions one rebalance cycle will take. With unchanged market data
/// the plan is all holds: running it twice in a row places no orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub close: Vec<CloseDirective>,
    pub open: Vec<OpenDirective>,
    pub hold: Vec<HoldDirective>,
}

impl RebalancePlan {
    pub fn is_noop(&self) -> bool {
        self.close.is_empty() && self.open.is_empty()
    }
}

/// Diffs currently-open positions against a fresh top-N selection.
pub struct RebalancePlanner {
    exit_mode: SpreadExitMode,
    /// Annualized threshold as a fraction; only consulted in
    /// `BelowThreshold` mode.
    min_annual_spread: f64,
}

impl RebalancePlanner {
    pub fn new(exit_mode: SpreadExitMode, min_annual_spread: f64) -> Self {
        Self {
            exit_mode,
            min_annual_spread,
        }
    }

    /// Build the plan for one cycle.
    ///
    /// `positions` carry a `current_spread` refreshed by the most recent
    /// tick; a direction flip shows up there as a negative oriented
    /// spread, so leg-assignment changes are caught even when the asset
    /// still ranks. A canonical closed this cycle is not reopened in the
    /// same plan: re-entry waits for the next cycle, which keeps a
    /// borderline spread from thrashing.
    pub fn plan(
        &self,
        positions: &[StrategyPosition],
        selection: &[FundingSpread],
        allocations: &[RankAllocation],
    ) -> RebalancePlan {
        let mut plan = RebalancePlan::default();
        let mut closing: HashSet<String> = HashSet::new();

        for position in positions {
            if position.status != PositionStatus::Open {
                // A position stuck mid-close still occupies its asset;
                // blocking re-entry keeps exposure single-sided at most.
                if position.status == PositionStatus::Closing {
                    closing.insert(position.canonical.clone());
                }
                continue;
            }

            if let Some(reason) = self.spread_exit(position) {
                plan.close.push(CloseDirective {
                    position_id: position.id,
                    canonical: position.canonical.clone(),
                    reason,
                });
                closing.insert(position.canonical.clone());
                continue;
            }

            match selection
                .iter()
                .position(|s| s.canonical == position.canonical)
            {
                Some(index) => plan.hold.push(HoldDirective {
                    position_id: position.id,
                    canonical: position.canonical.clone(),
                    rank: index + 1,
                }),
                None => {
                    plan.close.push(CloseDirective {
                        position_id: position.id,
                        canonical: position.canonical.clone(),
                        reason: CloseReason::RankEviction,
                    });
                    closing.insert(position.canonical.clone());
                }
            }
        }

        let held: HashSet<&str> = plan.hold.iter().map(|h| h.canonical.as_str()).collect();

        for (index, spread) in selection.iter().enumerate() {
            if held.contains(spread.canonical.as_str()) || closing.contains(&spread.canonical) {
                continue;
            }
            let Some(allocation) = allocations.get(index) else {
                continue;
            };
            plan.open.push(OpenDirective {
                spread: spread.clone(),
                rank: index + 1,
                allocation: allocation.clone(),
            });
        }

        plan
    }

    fn spread_exit(&self, position: &StrategyPosition) -> Option<CloseReason> {
        if position.current_spread < 0.0 {
            return Some(CloseReason::SpreadFlip);
        }
        if self.exit_mode == SpreadExitMode::BelowThreshold
            && position.current_spread < self.min_annual_spread
        {
            return Some(CloseReason::BelowThreshold);
        }
        None
    }
}
