//! Unit tests for the rebalance planner

use arbitrix::engine::allocation::AllocationEngine;
use arbitrix::engine::plan::RebalancePlanner;
use arbitrix::models::funding::{ExchangeId, FundingSpread};
use arbitrix::models::position::{CloseReason, PositionLeg, PositionStatus, StrategyPosition};
use arbitrix::models::strategy::SpreadExitMode;
use chrono::Utc;
use uuid::Uuid;

fn spread(canonical: &str, annual: f64) -> FundingSpread {
    let short_rate = annual / (3.0 * 365.0);
    FundingSpread {
        canonical: canonical.to_string(),
        long_exchange: ExchangeId::Hyperliquid,
        short_exchange: ExchangeId::Aster,
        long_rate: 0.0,
        short_rate,
        spread: short_rate,
        annual_spread: annual,
        long_mark_price: 100.0,
        short_mark_price: 100.0,
    }
}

fn leg(exchange: ExchangeId, symbol: &str) -> PositionLeg {
    PositionLeg {
        exchange,
        symbol: symbol.to_string(),
        size_usd: 50.0,
        quantity: 0.5,
        entry_price: 100.0,
        mark_price: 100.0,
        next_funding_time: None,
        current_rate: 0.0001,
        closed: false,
    }
}

fn position(canonical: &str, current_spread: f64) -> StrategyPosition {
    StrategyPosition {
        id: Uuid::new_v4(),
        canonical: canonical.to_string(),
        rank: 1,
        allocation_pct: 50.0,
        long: leg(ExchangeId::Hyperliquid, canonical),
        short: leg(ExchangeId::Aster, &format!("{}USDT", canonical)),
        entry_spread: 0.6,
        current_spread,
        entry_time: Utc::now(),
        exit_time: None,
        funding_earned: 0.0,
        pnl: 0.0,
        status: PositionStatus::Open,
        close_reason: None,
    }
}

fn allocations(capital: f64, count: usize) -> Vec<arbitrix::engine::allocation::RankAllocation> {
    AllocationEngine::new(capital, vec![60.0, 40.0])
        .unwrap()
        .size(count)
}

#[test]
fn unchanged_market_data_is_a_noop() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("BTC", 0.8), position("ETH", 0.6)];
    let selection = vec![spread("BTC", 0.8), spread("ETH", 0.6)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 2));
    assert!(plan.is_noop());
    assert_eq!(plan.hold.len(), 2);
}

#[test]
fn evicted_rank_closes() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("DOGE", 0.55)];
    let selection = vec![spread("BTC", 0.9), spread("ETH", 0.8)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 2));
    assert_eq!(plan.close.len(), 1);
    assert_eq!(plan.close[0].reason, CloseReason::RankEviction);
    assert_eq!(plan.open.len(), 2);
}

#[test]
fn sign_flip_closes_even_while_still_ranked() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("BTC", -0.003)];
    // The asset still ranks after the flip (direction reversed on the
    // fresh spread).
    let selection = vec![spread("BTC", 0.7)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 1));
    assert_eq!(plan.close.len(), 1);
    assert_eq!(plan.close[0].reason, CloseReason::SpreadFlip);
    // No same-cycle re-entry for a canonical being closed.
    assert!(plan.open.is_empty());
    assert!(plan.hold.is_empty());
}

#[test]
fn below_threshold_mode_evicts_weakening_spreads() {
    let planner = RebalancePlanner::new(SpreadExitMode::BelowThreshold, 0.5);
    let positions = vec![position("BTC", 0.3)];
    let selection = vec![spread("BTC", 0.3)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 1));
    assert_eq!(plan.close.len(), 1);
    assert_eq!(plan.close[0].reason, CloseReason::BelowThreshold);
}

#[test]
fn sign_flip_mode_tolerates_weak_but_positive_spreads() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("BTC", 0.3)];
    let selection = vec![spread("BTC", 0.3)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 1));
    assert!(plan.is_noop());
}

#[test]
fn newly_qualifying_rank_opens_with_its_allocation() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("BTC", 0.9)];
    let selection = vec![spread("BTC", 0.9), spread("ETH", 0.6)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 2));
    assert_eq!(plan.hold.len(), 1);
    assert_eq!(plan.open.len(), 1);
    assert_eq!(plan.open[0].spread.canonical, "ETH");
    assert_eq!(plan.open[0].rank, 2);
    assert!((plan.open[0].allocation.notional_usd - 40.0).abs() < 1e-9);
}

#[test]
fn held_positions_pick_up_their_new_rank() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let positions = vec![position("ETH", 0.6)];
    let selection = vec![spread("BTC", 0.9), spread("ETH", 0.6)];

    let plan = planner.plan(&positions, &selection, &allocations(100.0, 2));
    assert_eq!(plan.hold.len(), 1);
    assert_eq!(plan.hold[0].rank, 2);
}

#[test]
fn non_open_positions_are_ignored() {
    let planner = RebalancePlanner::new(SpreadExitMode::SignFlip, 0.5);
    let mut closing = position("BTC", 0.9);
    closing.status = PositionStatus::Closing;
    let selection = vec![spread("BTC", 0.9)];

    let plan = planner.plan(&[closing], &selection, &allocations(100.0, 1));
    // A stuck closing position neither holds nor re-opens: its asset is
    // blocked until the manager's retry path resolves it.
    assert!(plan.hold.is_empty());
    assert!(plan.close.is_empty());
    assert!(plan.open.is_empty());
}
