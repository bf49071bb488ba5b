//! Job queue system for the rebalance workflow
//!
//! The workflow is: FetchRatesJob → RebalanceJob → PersistOutcomeJob,
//! with ClosePositionJob handling user-requested closes out of band.

pub mod context;
pub mod handlers;
pub mod types;

pub use context::JobContext;
pub use types::{ClosePositionJob, FetchRatesJob, PersistOutcomeJob, RebalanceJob};
