//! Unit tests for the position manager

use arbitrix::engine::allocation::RankAllocation;
use arbitrix::engine::plan::OpenDirective;
use arbitrix::exchanges::{FundingFeed, PaperExchange, VenueHandle};
use arbitrix::models::error::OrderSide;
use arbitrix::models::funding::{AssetMapping, ExchangeId, FundingSpread, VenueSnapshot};
use arbitrix::models::position::{CloseReason, PositionStatus};
use arbitrix::positions::PositionManager;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

struct Harness {
    aster: Arc<PaperExchange>,
    hyperliquid: Arc<PaperExchange>,
    manager: PositionManager,
}

impl Harness {
    async fn new() -> Self {
        let aster = Arc::new(PaperExchange::new(ExchangeId::Aster));
        let hyperliquid = Arc::new(PaperExchange::new(ExchangeId::Hyperliquid));
        aster.set_rate("BTCUSDT", 0.0001, 100.0).await;
        aster.set_rate("ETHUSDT", 0.0002, 50.0).await;
        hyperliquid.set_rate("BTC", 0.000001, 100.0).await;
        hyperliquid.set_rate("ETH", 0.000002, 50.0).await;

        let manager = PositionManager::new(vec![
            VenueHandle::from_client(ExchangeId::Aster, aster.clone()),
            VenueHandle::from_client(ExchangeId::Hyperliquid, hyperliquid.clone()),
        ]);

        Self {
            aster,
            hyperliquid,
            manager,
        }
    }

    async fn snapshots(&self) -> HashMap<ExchangeId, VenueSnapshot> {
        let mut snapshots = HashMap::new();
        let a = self.aster.funding_snapshot().await.unwrap();
        let h = self.hyperliquid.funding_snapshot().await.unwrap();
        snapshots.insert(a.exchange, a);
        snapshots.insert(h.exchange, h);
        snapshots
    }
}

fn btc_directive(leg_usd: f64) -> OpenDirective {
    OpenDirective {
        spread: FundingSpread {
            canonical: "BTC".to_string(),
            long_exchange: ExchangeId::Hyperliquid,
            short_exchange: ExchangeId::Aster,
            long_rate: 0.000001,
            short_rate: 0.0001,
            spread: 0.000099,
            annual_spread: 0.0001 * 1095.0 - 0.000001 * 8760.0,
            long_mark_price: 100.0,
            short_mark_price: 100.0,
        },
        rank: 1,
        allocation: RankAllocation {
            rank: 1,
            pct: 100.0,
            notional_usd: leg_usd * 2.0,
            leg_usd,
        },
    }
}

fn btc_mapping() -> AssetMapping {
    AssetMapping::new("BTC", "BTCUSDT", "BTC")
}

#[tokio::test]
async fn entry_places_equal_value_legs() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;

    let position = h
        .manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await
        .expect("entry should succeed");

    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(h.manager.open_count(), 1);

    // $50 per leg at $100 mark: 0.5 contracts each way.
    let long_orders = h.hyperliquid.placed_orders().await;
    let short_orders = h.aster.placed_orders().await;
    assert_eq!(long_orders.len(), 1);
    assert_eq!(short_orders.len(), 1);
    assert_eq!(long_orders[0].side, OrderSide::Buy);
    assert!((long_orders[0].quantity - 0.5).abs() < 1e-9);
    assert_eq!(short_orders[0].side, OrderSide::Sell);
    assert!((short_orders[0].quantity - 0.5).abs() < 1e-9);
    assert!((position.long.size_usd - position.short.size_usd).abs() < 1e-9);
}

#[tokio::test]
async fn failed_second_leg_unwinds_the_first() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;
    h.aster.fail_orders("BTCUSDT", 1).await;

    let result = h
        .manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await;
    assert!(result.is_err());

    // Never a one-sided position: the long leg was bought and sold back.
    assert_eq!(h.manager.open_count(), 0);
    let hl_orders = h.hyperliquid.placed_orders().await;
    assert_eq!(hl_orders.len(), 2);
    assert_eq!(hl_orders[0].side, OrderSide::Buy);
    assert_eq!(hl_orders[1].side, OrderSide::Sell);
    assert!(h.aster.placed_orders().await.is_empty());
}

#[tokio::test]
async fn failed_first_leg_places_nothing_else() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;
    h.hyperliquid.fail_orders("BTC", 1).await;

    let result = h
        .manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await;
    assert!(result.is_err());
    assert_eq!(h.manager.open_count(), 0);
    assert!(h.hyperliquid.placed_orders().await.is_empty());
    assert!(h.aster.placed_orders().await.is_empty());
}

#[tokio::test]
async fn funding_accrues_when_the_deadline_passes() {
    let mut h = Harness::new().await;

    let past = Utc::now() - Duration::minutes(5);
    h.aster.set_next_funding_time("BTCUSDT", past).await;
    h.hyperliquid.set_next_funding_time("BTC", past).await;
    let entry_snapshots = h.snapshots().await;

    h.manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &entry_snapshots)
        .await
        .expect("entry should succeed");

    let tick_snapshots = h.snapshots().await;
    h.manager.tick(&tick_snapshots);

    let positions = h.manager.open_positions();
    let position = &positions[0];
    // Short leg receives 50 * 0.0001, long leg pays 50 * 0.000001.
    let expected = 50.0 * 0.0001 - 50.0 * 0.000001;
    assert!(
        (position.funding_earned - expected).abs() < 1e-12,
        "funding_earned was {}",
        position.funding_earned
    );
    assert!(position.current_spread > 0.0);
    assert!((position.pnl - position.funding_earned).abs() < 1e-9);

    // A second tick against the same stale deadline must not re-accrue.
    let tick_snapshots = h.snapshots().await;
    h.manager.tick(&tick_snapshots);
    let positions = h.manager.open_positions();
    assert!((positions[0].funding_earned - expected).abs() < 1e-12);
}

#[tokio::test]
async fn close_retries_a_failing_leg() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;
    let position = h
        .manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await
        .unwrap();

    // First closing attempt on the short leg fails, the retry lands.
    h.aster.fail_orders("BTCUSDT", 1).await;
    let closed = h
        .manager
        .close_position(position.id, CloseReason::Manual)
        .await
        .expect("close should succeed after retry");

    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::Manual));
    assert!(closed.exit_time.is_some());
    assert_eq!(h.manager.open_count(), 0);
    assert_eq!(h.manager.closed_positions().len(), 1);
    // Entry + one successful close on each venue.
    assert_eq!(h.aster.order_count().await, 2);
    assert_eq!(h.hyperliquid.order_count().await, 2);
}

#[tokio::test]
async fn stuck_closing_leg_keeps_residual_exposure_visible() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;
    let position = h
        .manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await
        .unwrap();

    // Exhaust every retry on the short leg.
    h.aster.fail_orders("BTCUSDT", 100).await;
    let result = h
        .manager
        .close_position(position.id, CloseReason::Manual)
        .await;
    assert!(result.is_err());

    // The position is still tracked, half-closed, for reconciliation.
    let open = h.manager.open_positions();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, PositionStatus::Closing);
    assert!(open[0].long.closed);
    assert!(!open[0].short.closed);

    // Once the venue recovers, a second close finishes the job without
    // re-placing the already-closed long leg.
    h.aster.fail_orders("BTCUSDT", 0).await;
    h.manager
        .close_position(position.id, CloseReason::Manual)
        .await
        .expect("second close should succeed");
    assert_eq!(h.manager.open_count(), 0);
    assert_eq!(h.hyperliquid.order_count().await, 2);
}

#[tokio::test]
async fn force_close_sweeps_every_position() {
    let mut h = Harness::new().await;
    let snapshots = h.snapshots().await;

    h.manager
        .open_position(&btc_directive(50.0), &btc_mapping(), &snapshots)
        .await
        .unwrap();

    let mut eth = btc_directive(25.0);
    eth.spread.canonical = "ETH".to_string();
    eth.spread.long_rate = 0.000002;
    eth.spread.short_rate = 0.0002;
    eth.spread.long_mark_price = 50.0;
    eth.spread.short_mark_price = 50.0;
    eth.rank = 2;
    let eth_mapping = AssetMapping::new("ETH", "ETHUSDT", "ETH");
    h.manager
        .open_position(&eth, &eth_mapping, &snapshots)
        .await
        .unwrap();

    let closed = h.manager.force_close_all(CloseReason::Shutdown).await;
    assert_eq!(closed.len(), 2);
    assert_eq!(h.manager.open_count(), 0);
    assert!(closed
        .iter()
        .all(|p| p.close_reason == Some(CloseReason::Shutdown)));
}
