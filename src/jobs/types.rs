//! Job types for the rebalance workflow

use crate::core::service::{RebalanceOutcome, RebalanceTrigger};
use crate::models::event::StrategyEvent;
use crate::models::funding::VenueSnapshot;
use serde::{Deserialize, Serialize};

/// Job to fetch fresh funding snapshots from every venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRatesJob {
    pub trigger: RebalanceTrigger,
}

/// Job to run one rebalance cycle against fetched snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceJob {
    pub trigger: RebalanceTrigger,
    pub snapshots: Vec<VenueSnapshot>,
}

/// Job to persist a rebalance outcome and its events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistOutcomeJob {
    pub outcome: RebalanceOutcome,
    pub events: Vec<StrategyEvent>,
}

/// Job to close one open position on user request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePositionJob {
    pub canonical: String,
}
