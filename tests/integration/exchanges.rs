//! Integration tests for the venue REST clients, backed by wiremock.

use arbitrix::exchanges::{
    AsterClient, BalanceSource, FundingFeed, HyperliquidClient, OrderGateway, OrderRequest,
};
use arbitrix::models::error::OrderSide;
use arbitrix::models::funding::ExchangeId;
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_aster_market_data(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/fapi/v1/premiumIndex"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "symbol": "BTCUSDT",
                "markPrice": "65000.50",
                "lastFundingRate": "0.00011",
                "nextFundingTime": 1754640000000i64,
                "time": 1754611200000i64
            },
            {
                "symbol": "ETHUSDT",
                "markPrice": "3400.10",
                "lastFundingRate": "-0.00003",
                "nextFundingTime": 1754640000000i64,
                "time": 1754611200000i64
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/24hr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "symbol": "BTCUSDT", "quoteVolume": "250000000.5" },
            { "symbol": "ETHUSDT", "quoteVolume": "90000000.0" }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn aster_snapshot_parses_typed_fields() {
    let server = MockServer::start().await;
    mock_aster_market_data(&server).await;

    let client = AsterClient::with_base_url(server.uri());
    let snapshot = assert_ok!(client.funding_snapshot().await);

    assert_eq!(snapshot.exchange, ExchangeId::Aster);
    assert_eq!(snapshot.rates.len(), 2);

    let btc = snapshot.rate("BTCUSDT").expect("BTCUSDT rate");
    assert!((btc.rate - 0.00011).abs() < 1e-12);
    assert!((btc.mark_price - 65000.50).abs() < 1e-9);
    assert!(btc.next_funding_time.is_some());

    let meta = snapshot.meta.get("BTCUSDT").expect("BTCUSDT meta");
    assert!((meta.day_volume_usd.unwrap() - 250_000_000.5).abs() < 1e-6);
}

#[tokio::test]
async fn aster_rejects_malformed_numeric_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/premiumIndex"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "symbol": "BTCUSDT",
                "markPrice": "not-a-number",
                "lastFundingRate": "0.0001",
                "nextFundingTime": 1754640000000i64,
                "time": 1754611200000i64
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/24hr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = AsterClient::with_base_url(server.uri());
    let result = client.funding_snapshot().await;

    // Loud failure, never a silent zero.
    let err = result.err().expect("expected parse error");
    assert!(err.to_string().contains("markPrice"), "error was: {}", err);
}

#[tokio::test]
async fn aster_balance_reads_the_usdt_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "asset": "BTC", "availableBalance": "0.5" },
            { "asset": "USDT", "availableBalance": "12345.67" }
        ])))
        .mount(&server)
        .await;

    let client = AsterClient::with_base_url(server.uri());
    let balance = client.available_usd().await.expect("balance");
    assert!((balance - 12345.67).abs() < 1e-9);
}

#[tokio::test]
async fn aster_order_returns_a_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orderId": 987654,
            "avgPrice": "65001.00"
        })))
        .mount(&server)
        .await;

    let client = AsterClient::with_base_url(server.uri());
    let receipt = client
        .place_order(&OrderRequest::market("BTCUSDT", OrderSide::Buy, 0.5))
        .await
        .expect("order");

    assert_eq!(receipt.order_id, "987654");
    assert!((receipt.fill_price.unwrap() - 65001.0).abs() < 1e-9);
}

#[tokio::test]
async fn aster_order_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": -2019, "msg": "Margin is insufficient."
        })))
        .mount(&server)
        .await;

    let client = AsterClient::with_base_url(server.uri());
    let result = client
        .place_order(&OrderRequest::market("BTCUSDT", OrderSide::Buy, 0.5))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn hyperliquid_snapshot_zips_universe_and_contexts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_json(json!({"type": "metaAndAssetCtxs"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "universe": [ { "name": "BTC" }, { "name": "ETH" } ] },
            [
                { "funding": "0.0000125", "markPx": "65010.0", "dayNtlVlm": "500000000.0" },
                { "funding": "-0.0000031", "markPx": "3401.5", "dayNtlVlm": "120000000.0" }
            ]
        ])))
        .mount(&server)
        .await;

    let client = HyperliquidClient::with_base_url(server.uri());
    let snapshot = assert_ok!(client.funding_snapshot().await);

    assert_eq!(snapshot.exchange, ExchangeId::Hyperliquid);
    assert_eq!(snapshot.rates.len(), 2);

    let eth = snapshot.rate("ETH").expect("ETH rate");
    assert!((eth.rate - (-0.0000031)).abs() < 1e-12);
    assert!((eth.mark_price - 3401.5).abs() < 1e-9);
    // Hourly funding: the next settlement is always on the next hour.
    assert!(eth.next_funding_time.is_some());

    let meta = snapshot.meta.get("BTC").expect("BTC meta");
    assert!((meta.day_volume_usd.unwrap() - 500_000_000.0).abs() < 1e-3);
}

#[tokio::test]
async fn hyperliquid_rejects_mismatched_universe_lengths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "universe": [ { "name": "BTC" }, { "name": "ETH" } ] },
            [
                { "funding": "0.0000125", "markPx": "65010.0", "dayNtlVlm": "500000000.0" }
            ]
        ])))
        .mount(&server)
        .await;

    let client = HyperliquidClient::with_base_url(server.uri());
    let result = client.funding_snapshot().await;
    let err = result.err().expect("expected length mismatch error");
    assert!(err.to_string().contains("lengths differ"), "error was: {}", err);
}

#[tokio::test]
async fn hyperliquid_balance_requires_a_wallet() {
    let server = MockServer::start().await;
    let client = HyperliquidClient::with_base_url(server.uri());
    assert!(client.available_usd().await.is_err());
}

#[tokio::test]
async fn hyperliquid_balance_reads_withdrawable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_json(
            json!({"type": "clearinghouseState", "user": "0xabc"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "marginSummary": { "accountValue": "20000.0" },
            "withdrawable": "15000.25"
        })))
        .mount(&server)
        .await;

    let client = HyperliquidClient::with_base_url(server.uri()).with_wallet("0xabc");
    let balance = client.available_usd().await.expect("balance");
    assert!((balance - 15000.25).abs() < 1e-9);
}

#[tokio::test]
async fn hyperliquid_order_checks_the_status_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "response": {
                "type": "order",
                "data": { "statuses": [ { "filled": { "oid": 42, "avgPx": "65010.5", "totalSz": "0.5" } } ] }
            }
        })))
        .mount(&server)
        .await;

    let client = HyperliquidClient::with_base_url(server.uri());
    let receipt = client
        .place_order(&OrderRequest::market("BTC", OrderSide::Sell, 0.5))
        .await
        .expect("order");

    assert_eq!(receipt.order_id, "42");
    assert!((receipt.fill_price.unwrap() - 65010.5).abs() < 1e-9);
}

#[tokio::test]
async fn hyperliquid_err_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "err",
            "response": "Insufficient margin"
        })))
        .mount(&server)
        .await;

    let client = HyperliquidClient::with_base_url(server.uri());
    let result = client
        .place_order(&OrderRequest::market("BTC", OrderSide::Sell, 0.5))
        .await;
    assert!(result.is_err());
}
