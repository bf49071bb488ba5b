//! Hyperliquid REST client (info/exchange endpoints).

use crate::exchanges::{
    parse_numeric_field, BalanceSource, FundingFeed, OrderGateway, OrderReceipt, OrderRequest,
};
use crate::models::error::OrderSide;
use crate::models::funding::{AssetMeta, ExchangeId, FundingRate, VenueSnapshot};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.hyperliquid.xyz";

/// Thin REST client for Hyperliquid. Signing is out of scope here; the
/// exchange endpoint is reached through an injected base URL.
pub struct HyperliquidClient {
    http: reqwest::Client,
    base_url: String,
    wallet: Option<String>,
}

/// `metaAndAssetCtxs` returns a two-element array: the universe listing
/// and a parallel array of per-asset contexts.
#[derive(Debug, Deserialize)]
struct MetaAndAssetCtxs(Universe, Vec<AssetCtx>);

#[derive(Debug, Deserialize)]
struct Universe {
    universe: Vec<UniverseEntry>,
}

#[derive(Debug, Deserialize)]
struct UniverseEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetCtx {
    funding: String,
    mark_px: String,
    day_ntl_vlm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearinghouseState {
    withdrawable: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    status: String,
    #[serde(default)]
    response: Option<Value>,
}

impl HyperliquidClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            wallet: None,
        }
    }

    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "hyperliquid request to {} failed: {}",
                    path, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?
            .error_for_status()
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "hyperliquid request to {} rejected: {}",
                    path, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        response.json::<T>().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "hyperliquid response from {} did not match schema: {}",
                    path, e
                ),
            )) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}

impl Default for HyperliquidClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Hyperliquid settles funding hourly on the hour.
fn next_top_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = now + Duration::hours(1);
    next.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(next)
}

#[async_trait::async_trait]
impl FundingFeed for HyperliquidClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Hyperliquid
    }

    async fn funding_snapshot(
        &self,
    ) -> Result<VenueSnapshot, Box<dyn std::error::Error + Send + Sync>> {
        let body = json!({"type": "metaAndAssetCtxs"});
        let MetaAndAssetCtxs(universe, ctxs) = self.post_json("/info", &body).await?;

        if universe.universe.len() != ctxs.len() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "hyperliquid universe ({}) and asset contexts ({}) lengths differ",
                    universe.universe.len(),
                    ctxs.len()
                ),
            )));
        }

        let now = Utc::now();
        let next_funding = next_top_of_hour(now);
        let mut snapshot = VenueSnapshot::new(ExchangeId::Hyperliquid, now);

        for (entry, ctx) in universe.universe.into_iter().zip(ctxs) {
            let rate = parse_numeric_field("funding", &ctx.funding)?;
            let mark_price = parse_numeric_field("markPx", &ctx.mark_px)?;
            let volume = parse_numeric_field("dayNtlVlm", &ctx.day_ntl_vlm)?;

            snapshot.meta.insert(
                entry.name.clone(),
                AssetMeta {
                    market_cap_usd: None,
                    day_volume_usd: Some(volume),
                },
            );
            snapshot.insert(
                FundingRate::new(ExchangeId::Hyperliquid, entry.name, rate, mark_price)
                    .with_next_funding_time(next_funding),
            );
        }

        debug!(
            symbols = snapshot.rates.len(),
            "HyperliquidClient: funding snapshot with {} symbols",
            snapshot.rates.len()
        );
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl OrderGateway for HyperliquidClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Hyperliquid
    }

    async fn place_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, Box<dyn std::error::Error + Send + Sync>> {
        let body = json!({
            "action": {
                "type": "order",
                "orders": [{
                    "coin": request.symbol,
                    "is_buy": request.side == OrderSide::Buy,
                    "sz": format!("{:.6}", request.quantity),
                    "reduce_only": false,
                    "order_type": {"market": {}},
                }],
            },
        });

        let response: ExchangeResponse = self.post_json("/exchange", &body).await?;
        if response.status != "ok" {
            return Err(Box::new(std::io::Error::other(format!(
                "hyperliquid order for {} rejected with status '{}'",
                request.symbol, response.status
            ))));
        }

        // Fill details sit deep in the response; absence is tolerable,
        // a bad status above is not.
        let status = response
            .response
            .as_ref()
            .and_then(|r| r.pointer("/data/statuses/0/filled"));
        let order_id = status
            .and_then(|f| f.get("oid"))
            .and_then(|v| v.as_i64())
            .map(|oid| oid.to_string())
            .unwrap_or_else(|| format!("hl-{}", request.symbol));
        let fill_price = status
            .and_then(|f| f.get("avgPx"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());

        Ok(OrderReceipt {
            order_id,
            fill_price,
        })
    }
}

#[async_trait::async_trait]
impl BalanceSource for HyperliquidClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Hyperliquid
    }

    async fn available_usd(&self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let wallet = self.wallet.as_ref().ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "hyperliquid balance query requires a wallet address",
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let body = json!({"type": "clearinghouseState", "user": wallet});
        let state: ClearinghouseState = self.post_json("/info", &body).await?;
        parse_numeric_field("withdrawable", &state.withdrawable)
    }
}
