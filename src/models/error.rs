//! Engine error taxonomy.
//!
//! Configuration and eligibility problems are validation results, not
//! crashes: they are rejected before any order is placed. Order execution
//! failures carry venue/symbol/side so a human can reconcile manually.

use crate::models::funding::ExchangeId;
use std::fmt;

/// Order side, shared by the error type and the exchange gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineError {
    /// Invalid strategy configuration (capital, allocation table, pairs).
    /// Rejected synchronously before any capital is deployed.
    Configuration(String),
    /// A required funding rate or price is missing: the candidate is
    /// skipped, the cycle continues.
    MarketData {
        exchange: ExchangeId,
        symbol: String,
        detail: String,
    },
    /// An order leg failed at the venue.
    OrderExecution {
        exchange: ExchangeId,
        symbol: String,
        side: OrderSide,
        detail: String,
    },
    /// A market failed an eligibility minimum. A filtered-out candidate
    /// with a reason, not an exception.
    Eligibility { canonical: String, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration(detail) => write!(f, "configuration error: {}", detail),
            EngineError::MarketData {
                exchange,
                symbol,
                detail,
            } => write!(
                f,
                "market data unavailable for {} on {}: {}",
                symbol, exchange, detail
            ),
            EngineError::OrderExecution {
                exchange,
                symbol,
                side,
                detail,
            } => write!(
                f,
                "order execution failed: {} {} on {}: {}",
                side, symbol, exchange, detail
            ),
            EngineError::Eligibility { canonical, reason } => {
                write!(f, "{} ineligible: {}", canonical, reason)
            }
        }
    }
}

impl std::error::Error for EngineError {}
