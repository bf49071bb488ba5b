//! Unit tests for the strategy service

use arbitrix::core::service::{RebalanceStatus, RebalanceTrigger, StrategyService};
use arbitrix::exchanges::{PaperExchange, VenueHandle};
use arbitrix::models::funding::ExchangeId;
use arbitrix::models::position::CloseReason;
use arbitrix::models::strategy::StrategyConfig;
use std::sync::Arc;

/// Per-period Aster rate that annualizes to the given APR fraction.
fn aster_rate_for_apr(apr: f64) -> f64 {
    apr / (3.0 * 365.0)
}

struct Harness {
    aster: Arc<PaperExchange>,
    hyperliquid: Arc<PaperExchange>,
    service: StrategyService,
}

/// Capital $100 over top 2 at 60/40, threshold 50% APR. Three mapped
/// assets have rates: BTC at 80% APR, ETH at 55%, SOL at 20%.
async fn harness(mut config: StrategyConfig) -> Harness {
    let aster = Arc::new(PaperExchange::new(ExchangeId::Aster));
    let hyperliquid = Arc::new(PaperExchange::new(ExchangeId::Hyperliquid));

    aster
        .set_rate("BTCUSDT", aster_rate_for_apr(0.80), 65_000.0)
        .await;
    aster
        .set_rate("ETHUSDT", aster_rate_for_apr(0.55), 3_400.0)
        .await;
    aster
        .set_rate("SOLUSDT", aster_rate_for_apr(0.20), 150.0)
        .await;
    hyperliquid.set_rate("BTC", 0.0, 65_000.0).await;
    hyperliquid.set_rate("ETH", 0.0, 3_400.0).await;
    hyperliquid.set_rate("SOL", 0.0, 150.0).await;

    config.total_capital = 100.0;
    config.number_of_pairs = 2;
    config.allocations = vec![60.0, 40.0];
    config.min_spread_threshold_pct = 50.0;

    let venues = vec![
        VenueHandle::from_client(ExchangeId::Aster, aster.clone()),
        VenueHandle::from_client(ExchangeId::Hyperliquid, hyperliquid.clone()),
    ];
    let service = StrategyService::new(config, venues, None).expect("valid config");

    Harness {
        aster,
        hyperliquid,
        service,
    }
}

#[tokio::test]
async fn start_opens_the_top_two_sized_60_40() {
    let h = harness(StrategyConfig::default()).await;

    let outcome = h.service.start().await.expect("start should succeed");
    assert_eq!(outcome.status, RebalanceStatus::Completed);
    assert_eq!(outcome.selected, 2);
    assert_eq!(outcome.opened, 2);
    assert_eq!(outcome.closed, 0);

    let status = h.service.status().await;
    assert!(status.running);
    assert_eq!(status.open_positions.len(), 2);

    let btc = status
        .open_positions
        .iter()
        .find(|p| p.canonical == "BTC")
        .expect("BTC position");
    let eth = status
        .open_positions
        .iter()
        .find(|p| p.canonical == "ETH")
        .expect("ETH position");

    assert_eq!(btc.rank, 1);
    assert!((btc.notional_usd() - 60.0).abs() < 1e-6);
    assert!((btc.long.size_usd - 30.0).abs() < 1e-6);
    assert!((btc.short.size_usd - 30.0).abs() < 1e-6);
    assert_eq!(eth.rank, 2);
    assert!((eth.notional_usd() - 40.0).abs() < 1e-6);

    // SOL at 20% APR sits under the 50% threshold.
    assert!(outcome
        .skipped_candidates
        .iter()
        .any(|s| s.canonical == "SOL"));
    assert!((status.allocated_usd - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn rebalance_with_unchanged_data_places_no_orders() {
    let h = harness(StrategyConfig::default()).await;
    h.service.start().await.unwrap();

    let orders_before = h.aster.order_count().await + h.hyperliquid.order_count().await;
    assert_eq!(orders_before, 4);

    let outcome = h
        .service
        .rebalance(RebalanceTrigger::Timer)
        .await
        .expect("rebalance should succeed");

    assert_eq!(outcome.status, RebalanceStatus::Completed);
    assert_eq!(outcome.opened, 0);
    assert_eq!(outcome.closed, 0);
    assert_eq!(outcome.held, 2);

    let orders_after = h.aster.order_count().await + h.hyperliquid.order_count().await;
    assert_eq!(orders_after, orders_before);
}

#[tokio::test]
async fn spread_flip_closes_on_the_next_cycle() {
    let h = harness(StrategyConfig::default()).await;
    h.service.start().await.unwrap();

    // BTC funding inverts between ticks.
    h.aster
        .set_rate("BTCUSDT", -aster_rate_for_apr(0.22), 65_000.0)
        .await;

    let outcome = h
        .service
        .rebalance(RebalanceTrigger::Timer)
        .await
        .unwrap();

    assert_eq!(outcome.closed, 1);
    assert_eq!(outcome.held, 1);
    assert_eq!(outcome.opened, 0);
    assert_eq!(
        outcome.closed_positions[0].close_reason,
        Some(CloseReason::SpreadFlip)
    );
    assert_eq!(outcome.closed_positions[0].canonical, "BTC");

    let status = h.service.status().await;
    assert_eq!(status.open_positions.len(), 1);
    assert_eq!(status.open_positions[0].canonical, "ETH");
}

#[tokio::test]
async fn manual_rebalance_honors_the_cooldown() {
    let mut config = StrategyConfig::default();
    config.manual_cooldown_secs = 3600;
    let h = harness(config).await;
    h.service.start().await.unwrap();

    let first = h
        .service
        .rebalance(RebalanceTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(first.status, RebalanceStatus::Completed);

    let second = h
        .service
        .rebalance(RebalanceTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(second.status, RebalanceStatus::Skipped);
    assert!(second.warnings.iter().any(|w| w.contains("cooldown")));

    // Timer triggers are not throttled by the manual cooldown.
    let timer = h.service.rebalance(RebalanceTrigger::Timer).await.unwrap();
    assert_eq!(timer.status, RebalanceStatus::Completed);
}

#[tokio::test]
async fn stop_force_closes_everything() {
    let h = harness(StrategyConfig::default()).await;
    h.service.start().await.unwrap();

    let closed = h.service.stop().await.expect("stop should succeed");
    assert_eq!(closed.len(), 2);
    assert!(closed
        .iter()
        .all(|p| p.close_reason == Some(CloseReason::Shutdown)));

    let status = h.service.status().await;
    assert!(!status.running);
    assert!(status.open_positions.is_empty());
    assert_eq!(status.closed_count, 2);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = harness(StrategyConfig::default()).await;
    h.service.start().await.unwrap();
    assert!(h.service.start().await.is_err());
}

#[tokio::test]
async fn rebalance_while_stopped_is_skipped() {
    let h = harness(StrategyConfig::default()).await;
    let outcome = h
        .service
        .rebalance(RebalanceTrigger::Timer)
        .await
        .unwrap();
    assert_eq!(outcome.status, RebalanceStatus::Skipped);
}

#[tokio::test]
async fn insufficient_balance_skips_the_batch_with_a_warning() {
    let mut config = StrategyConfig::default();
    config.dry_run = false;
    let h = harness(config).await;
    h.aster.set_balance(10.0).await;

    let outcome = h.service.start().await.expect("start itself succeeds");
    assert_eq!(outcome.selected, 2);
    assert_eq!(outcome.opened, 0);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("insufficient balance")));
    assert_eq!(h.aster.order_count().await, 0);
    assert_eq!(h.hyperliquid.order_count().await, 0);
}

#[tokio::test]
async fn config_updates_only_while_stopped() {
    let h = harness(StrategyConfig::default()).await;
    h.service.start().await.unwrap();

    let mut new_config = h.service.config().await;
    new_config.min_spread_threshold_pct = 60.0;
    assert!(h.service.update_config(new_config.clone()).await.is_err());

    h.service.stop().await.unwrap();
    assert!(h.service.update_config(new_config).await.is_ok());
    assert_eq!(h.service.config().await.min_spread_threshold_pct, 60.0);
}

#[tokio::test]
async fn invalid_config_never_reaches_the_venues() {
    let mut config = StrategyConfig::default();
    config.allocations = vec![60.0, 30.0];
    config.number_of_pairs = 2;

    let aster = Arc::new(PaperExchange::new(ExchangeId::Aster));
    let hyperliquid = Arc::new(PaperExchange::new(ExchangeId::Hyperliquid));
    let venues = vec![
        VenueHandle::from_client(ExchangeId::Aster, aster.clone()),
        VenueHandle::from_client(ExchangeId::Hyperliquid, hyperliquid.clone()),
    ];

    assert!(StrategyService::new(config, venues, None).is_err());
    assert_eq!(aster.order_count().await, 0);
}
