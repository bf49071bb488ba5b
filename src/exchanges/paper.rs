//! In-memory simulated venue for dry-run mode and tests.

use crate::exchanges::{BalanceSource, FundingFeed, OrderGateway, OrderReceipt, OrderRequest};
use crate::models::funding::{AssetMeta, ExchangeId, FundingRate, VenueSnapshot};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

/// Simulated venue: rates and balances are set by the harness, orders
/// fill instantly at the current mark price. Failures can be injected per
/// symbol to exercise the one-sided-entry and stuck-closing-leg paths.
pub struct PaperExchange {
    id: ExchangeId,
    rates: RwLock<HashMap<String, FundingRate>>,
    meta: RwLock<HashMap<String, AssetMeta>>,
    balance: RwLock<f64>,
    orders: Mutex<Vec<OrderRequest>>,
    /// Remaining failures per symbol; an order against a listed symbol
    /// errors and decrements the count.
    fail_counts: Mutex<HashMap<String, u32>>,
}

impl PaperExchange {
    pub fn new(id: ExchangeId) -> Self {
        Self {
            id,
            rates: RwLock::new(HashMap::new()),
            meta: RwLock::new(HashMap::new()),
            balance: RwLock::new(100_000.0),
            orders: Mutex::new(Vec::new()),
            fail_counts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_rate(&self, symbol: &str, rate: f64, mark_price: f64) {
        let mut rates = self.rates.write().await;
        rates.insert(
            symbol.to_string(),
            FundingRate::new(self.id, symbol, rate, mark_price),
        );
    }

    pub async fn set_next_funding_time(&self, symbol: &str, at: DateTime<Utc>) {
        let mut rates = self.rates.write().await;
        if let Some(rate) = rates.get_mut(symbol) {
            rate.next_funding_time = Some(at);
        }
    }

    pub async fn remove_rate(&self, symbol: &str) {
        self.rates.write().await.remove(symbol);
    }

    pub async fn set_meta(&self, symbol: &str, meta: AssetMeta) {
        self.meta.write().await.insert(symbol.to_string(), meta);
    }

    pub async fn set_balance(&self, balance: f64) {
        *self.balance.write().await = balance;
    }

    /// Make the next `times` orders against `symbol` fail.
    pub async fn fail_orders(&self, symbol: &str, times: u32) {
        self.fail_counts
            .lock()
            .await
            .insert(symbol.to_string(), times);
    }

    /// Orders placed so far, in placement order.
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().await.clone()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.lock().await.len()
    }
}

#[async_trait::async_trait]
impl FundingFeed for PaperExchange {
    fn exchange(&self) -> ExchangeId {
        self.id
    }

    async fn funding_snapshot(
        &self,
    ) -> Result<VenueSnapshot, Box<dyn std::error::Error + Send + Sync>> {
        let mut snapshot = VenueSnapshot::new(self.id, Utc::now());
        snapshot.rates = self.rates.read().await.clone();
        snapshot.meta = self.meta.read().await.clone();
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl OrderGateway for PaperExchange {
    fn exchange(&self) -> ExchangeId {
        self.id
    }

    async fn place_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, Box<dyn std::error::Error + Send + Sync>> {
        {
            let mut fail_counts = self.fail_counts.lock().await;
            if let Some(remaining) = fail_counts.get_mut(&request.symbol) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Box::new(std::io::Error::other(format!(
                        "injected order failure for {}",
                        request.symbol
                    ))));
                }
            }
        }

        let fill_price = self
            .rates
            .read()
            .await
            .get(&request.symbol)
            .map(|r| r.mark_price);

        let mut orders = self.orders.lock().await;
        orders.push(request.clone());
        Ok(OrderReceipt {
            order_id: format!("paper-{}-{}", request.symbol, orders.len()),
            fill_price,
        })
    }
}

#[async_trait::async_trait]
impl BalanceSource for PaperExchange {
    fn exchange(&self) -> ExchangeId {
        self.id
    }

    async fn available_usd(&self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(*self.balance.read().await)
    }
}
