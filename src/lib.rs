//! Arbitrix: a funding-rate arbitrage strategy engine for perpetual
//! futures venues.
//!
//! Ranks cross-venue funding spreads, allocates a capital budget across
//! the top-N, holds delta-neutral long/short pairs, and rebalances on a
//! schedule: evicting positions that fall out of the ranking or whose
//! spread flips sign, and opening newly qualifying ones.

pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod engine;
pub mod exchanges;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod positions;
