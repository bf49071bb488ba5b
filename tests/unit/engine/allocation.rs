//! Unit tests for the allocation engine

use arbitrix::engine::allocation::AllocationEngine;
use arbitrix::models::error::EngineError;

#[test]
fn rejects_allocations_not_summing_to_100() {
    let result = AllocationEngine::new(1_000.0, vec![60.0, 39.0]);
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[test]
fn accepts_allocations_within_tolerance() {
    assert!(AllocationEngine::new(1_000.0, vec![60.0, 40.005]).is_ok());
    assert!(AllocationEngine::new(1_000.0, vec![60.0, 40.02]).is_err());
}

#[test]
fn rejects_non_positive_capital() {
    assert!(AllocationEngine::new(0.0, vec![100.0]).is_err());
    assert!(AllocationEngine::new(-50.0, vec![100.0]).is_err());
}

#[test]
fn sizes_ranks_with_equal_legs() {
    // The $100 / 60-40 scenario: two positions at $60 and $40, each
    // split evenly long/short.
    let engine = AllocationEngine::new(100.0, vec![60.0, 40.0]).unwrap();
    let allocations = engine.size(2);

    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].rank, 1);
    assert!((allocations[0].notional_usd - 60.0).abs() < 1e-9);
    assert!((allocations[0].leg_usd - 30.0).abs() < 1e-9);
    assert_eq!(allocations[1].rank, 2);
    assert!((allocations[1].notional_usd - 40.0).abs() < 1e-9);
    assert!((allocations[1].leg_usd - 20.0).abs() < 1e-9);
}

#[test]
fn redistributes_when_fewer_ranks_qualify() {
    let engine = AllocationEngine::new(1_000.0, vec![30.0, 30.0, 20.0, 10.0, 10.0]).unwrap();
    let allocations = engine.size(3);

    // The leading 30/30/20 renormalize to 37.5/37.5/25: no idle capital.
    assert_eq!(allocations.len(), 3);
    assert!((allocations[0].pct - 37.5).abs() < 1e-9);
    assert!((allocations[1].pct - 37.5).abs() < 1e-9);
    assert!((allocations[2].pct - 25.0).abs() < 1e-9);
    assert!((allocations[0].notional_usd - 375.0).abs() < 1e-6);
}

#[test]
fn aggregate_never_exceeds_total_capital() {
    let engine = AllocationEngine::new(777.0, vec![30.0, 30.0, 20.0, 10.0, 10.0]).unwrap();
    for count in 1..=5 {
        let total: f64 = engine.size(count).iter().map(|a| a.notional_usd).sum();
        assert!(
            total <= 777.0 + 1e-6,
            "allocated {} for {} ranks",
            total,
            count
        );
    }
}

#[test]
fn count_beyond_table_is_clamped() {
    let engine = AllocationEngine::new(100.0, vec![60.0, 40.0]).unwrap();
    assert_eq!(engine.size(5).len(), 2);
}

#[test]
fn zero_ranks_yields_no_allocations() {
    let engine = AllocationEngine::new(100.0, vec![100.0]).unwrap();
    assert!(engine.size(0).is_empty());
}
