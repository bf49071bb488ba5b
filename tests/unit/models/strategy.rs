//! Unit tests for strategy configuration validation

use arbitrix::models::error::EngineError;
use arbitrix::models::strategy::StrategyConfig;

#[test]
fn default_config_is_valid() {
    assert!(StrategyConfig::default().validate().is_ok());
}

#[test]
fn rejects_non_positive_capital() {
    let mut config = StrategyConfig::default();
    config.total_capital = 0.0;
    assert!(matches!(
        config.validate(),
        Err(EngineError::Configuration(_))
    ));

    config.total_capital = f64::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_allocations_off_by_more_than_tolerance() {
    let mut config = StrategyConfig::default();
    config.number_of_pairs = 2;
    config.allocations = vec![60.0, 39.5];
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("sum to 100"));
}

#[test]
fn accepts_allocations_within_tolerance() {
    let mut config = StrategyConfig::default();
    config.number_of_pairs = 2;
    config.allocations = vec![60.0, 40.005];
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_negative_allocation_entries() {
    let mut config = StrategyConfig::default();
    config.number_of_pairs = 2;
    config.allocations = vec![150.0, -50.0];
    assert!(config.validate().is_err());
}

#[test]
fn rejects_more_pairs_than_allocation_entries() {
    let mut config = StrategyConfig::default();
    config.number_of_pairs = 6;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_zero_rebalance_interval() {
    let mut config = StrategyConfig::default();
    config.rebalance_interval_minutes = 0;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_empty_mapping_set() {
    let mut config = StrategyConfig::default();
    config.mappings.clear();
    assert!(config.validate().is_err());
}

#[test]
fn threshold_percent_converts_to_fraction() {
    let mut config = StrategyConfig::default();
    config.min_spread_threshold_pct = 50.0;
    assert!((config.min_spread_threshold() - 0.5).abs() < 1e-12);
}

#[test]
fn config_round_trips_through_json() {
    let config = StrategyConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: StrategyConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.total_capital, config.total_capital);
    assert_eq!(parsed.mappings.len(), config.mappings.len());
    assert_eq!(parsed.exit_mode, config.exit_mode);
}
