//! Aster REST client (Binance-style futures API).

use crate::exchanges::{
    parse_numeric_field, BalanceSource, FundingFeed, OrderGateway, OrderReceipt, OrderRequest,
    OrderType,
};
use crate::models::error::OrderSide;
use crate::models::funding::{AssetMeta, ExchangeId, FundingRate, VenueSnapshot};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://fapi.asterdex.com";

/// Thin REST client for Aster. Request signing is terminated outside this
/// process; the client talks to an injected base URL.
pub struct AsterClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndexEntry {
    symbol: String,
    mark_price: String,
    last_funding_rate: String,
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayTickerEntry {
    symbol: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    avg_price: Option<String>,
}

impl AsterClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "aster request to {} failed: {}",
                    path, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?
            .error_for_status()
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "aster request to {} rejected: {}",
                    path, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        response.json::<T>().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("aster response from {} did not match schema: {}", path, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}

impl Default for AsterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FundingFeed for AsterClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Aster
    }

    async fn funding_snapshot(
        &self,
    ) -> Result<VenueSnapshot, Box<dyn std::error::Error + Send + Sync>> {
        let entries: Vec<PremiumIndexEntry> = self.get_json("/fapi/v1/premiumIndex").await?;
        let tickers: Vec<DayTickerEntry> = self.get_json("/fapi/v1/ticker/24hr").await?;

        let mut snapshot = VenueSnapshot::new(ExchangeId::Aster, Utc::now());
        for entry in entries {
            let rate = parse_numeric_field("lastFundingRate", &entry.last_funding_rate)?;
            let mark_price = parse_numeric_field("markPrice", &entry.mark_price)?;
            let mut funding = FundingRate::new(ExchangeId::Aster, &entry.symbol, rate, mark_price);
            funding.next_funding_time = DateTime::from_timestamp_millis(entry.next_funding_time);
            snapshot.insert(funding);
        }
        for ticker in tickers {
            let volume = parse_numeric_field("quoteVolume", &ticker.quote_volume)?;
            snapshot.meta.insert(
                ticker.symbol,
                AssetMeta {
                    market_cap_usd: None,
                    day_volume_usd: Some(volume),
                },
            );
        }

        debug!(
            symbols = snapshot.rates.len(),
            "AsterClient: funding snapshot with {} symbols",
            snapshot.rates.len()
        );
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl OrderGateway for AsterClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Aster
    }

    async fn place_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, Box<dyn std::error::Error + Send + Sync>> {
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };

        let mut params = vec![
            ("symbol".to_string(), request.symbol.clone()),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), format!("{:.6}", request.quantity)),
        ];
        if let Some(price) = request.price {
            params.push(("price".to_string(), format!("{:.6}", price)));
        }

        let url = format!("{}/fapi/v1/order", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "aster order for {} failed: {}",
                    request.symbol, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?
            .error_for_status()
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "aster order for {} rejected: {}",
                    request.symbol, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let order: OrderResponse = response.json().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("aster order response did not match schema: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let fill_price = match order.avg_price {
            Some(ref price) => Some(parse_numeric_field("avgPrice", price)?),
            None => None,
        };

        Ok(OrderReceipt {
            order_id: order.order_id.to_string(),
            fill_price,
        })
    }
}

#[async_trait::async_trait]
impl BalanceSource for AsterClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Aster
    }

    async fn available_usd(&self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let balances: Vec<BalanceEntry> = self.get_json("/fapi/v2/balance").await?;
        let usdt = balances.iter().find(|b| b.asset == "USDT").ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "aster balance response has no USDT entry",
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        parse_numeric_field("availableBalance", &usdt.available_balance)
    }
}
