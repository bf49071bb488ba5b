//! Persistence layer (QuestDB over the Postgres wire protocol).

pub mod questdb;

pub use questdb::{ClosedPositionRow, RebalanceRow, StrategyStore};
