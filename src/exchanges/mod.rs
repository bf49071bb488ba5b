//! Venue collaborators behind narrow trait contracts.
//!
//! The engine only ever sees these traits: a latest-snapshot funding
//! feed, an order gateway treated as atomic per leg, and a balance
//! query used for pre-trade validation. Wire-level concerns stay inside
//! the per-venue clients.

pub mod aster;
pub mod hyperliquid;
pub mod paper;

use crate::models::error::OrderSide;
use crate::models::funding::{ExchangeId, VenueSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use aster::AsterClient;
pub use hyperliquid::HyperliquidClient;
pub use paper::PaperExchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: None,
            order_type: OrderType::Market,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
}

/// Latest funding snapshot per symbol for one venue.
#[async_trait::async_trait]
pub trait FundingFeed: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    async fn funding_snapshot(
        &self,
    ) -> Result<VenueSnapshot, Box<dyn std::error::Error + Send + Sync>>;
}

/// Order placement, atomic per leg. Two-leg coordination lives in the
/// position manager, not here.
#[async_trait::async_trait]
pub trait OrderGateway: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    async fn place_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, Box<dyn std::error::Error + Send + Sync>>;
}

/// Available USD-equivalent balance, used for pre-trade validation only.
#[async_trait::async_trait]
pub trait BalanceSource: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    async fn available_usd(&self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

/// Everything the engine needs from one venue.
#[derive(Clone)]
pub struct VenueHandle {
    pub id: ExchangeId,
    pub feed: Arc<dyn FundingFeed>,
    pub orders: Arc<dyn OrderGateway>,
    pub balance: Arc<dyn BalanceSource>,
}

impl VenueHandle {
    /// Wrap a client that implements all three venue traits.
    pub fn from_client<C>(id: ExchangeId, client: Arc<C>) -> Self
    where
        C: FundingFeed + OrderGateway + BalanceSource + 'static,
    {
        Self {
            id,
            feed: client.clone(),
            orders: client.clone(),
            balance: client,
        }
    }
}

/// Parse a numeric string field from a venue payload, failing loudly.
///
/// Venue responses carry numbers as strings; a malformed value must be an
/// error, never a silent zero: wrong balances drive bad allocation math.
pub(crate) fn parse_numeric_field(
    field: &str,
    value: &str,
) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
    value.parse::<f64>().map_err(|e| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {} '{}': {}", field, value, e),
        )) as Box<dyn std::error::Error + Send + Sync>
    })
}
