//! Delta-neutral position lifecycle: entry, funding accrual, exit.

use crate::engine::plan::OpenDirective;
use crate::exchanges::{OrderGateway, OrderReceipt, OrderRequest, VenueHandle};
use crate::metrics::Metrics;
use crate::models::error::{EngineError, OrderSide};
use crate::models::event::{EventKind, EventLevel, EventSink, StrategyEvent};
use crate::models::funding::{AssetMapping, ExchangeId, VenueSnapshot};
use crate::models::position::{CloseReason, PositionLeg, PositionStatus, StrategyPosition};
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const CLOSE_RETRY_ATTEMPTS: usize = 3;
const CLOSE_RETRY_MIN_DELAY: Duration = Duration::from_millis(250);

/// Owns the open-position list and the closed history, and coordinates
/// the two order legs per position.
///
/// Entry is all-or-nothing: a position is never recorded open unless both
/// legs filled, and a filled first leg is unwound when the second leg
/// fails. Exits retry the failing leg; a position whose closing leg is
/// stuck stays in `Closing` with its residual exposure visible rather
/// than being dropped.
pub struct PositionManager {
    venues: HashMap<ExchangeId, VenueHandle>,
    open: Vec<StrategyPosition>,
    closed: Vec<StrategyPosition>,
    sinks: Vec<Arc<dyn EventSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl PositionManager {
    pub fn new(venues: Vec<VenueHandle>) -> Self {
        Self {
            venues: venues.into_iter().map(|v| (v.id, v)).collect(),
            open: Vec::new(),
            closed: Vec::new(),
            sinks: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn emit(&self, event: StrategyEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }

    fn venue(
        &self,
        id: ExchangeId,
    ) -> Result<&VenueHandle, Box<dyn std::error::Error + Send + Sync>> {
        self.venues.get(&id).ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no venue handle registered for {}", id),
            )) as Box<dyn std::error::Error + Send + Sync>
        })
    }

    /// Snapshot of open positions (including any stuck in `Closing`).
    pub fn open_positions(&self) -> Vec<StrategyPosition> {
        self.open.clone()
    }

    /// Closed-position history for this process lifetime, oldest first.
    pub fn closed_positions(&self) -> Vec<StrategyPosition> {
        self.closed.clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// USD notional currently deployed across open positions.
    pub fn allocated_usd(&self) -> f64 {
        self.open.iter().map(|p| p.notional_usd()).sum()
    }

    /// Net funding accrued across open positions.
    pub fn open_funding_usd(&self) -> f64 {
        self.open.iter().map(|p| p.funding_earned).sum()
    }

    /// Open a delta-neutral pair per the rebalance directive.
    ///
    /// Leg order: long first (the venue paying less), then short. The
    /// first leg is unwound if the second fails.
    pub async fn open_position(
        &mut self,
        directive: &OpenDirective,
        mapping: &AssetMapping,
        snapshots: &HashMap<ExchangeId, VenueSnapshot>,
    ) -> Result<StrategyPosition, Box<dyn std::error::Error + Send + Sync>> {
        let spread = &directive.spread;
        let canonical = spread.canonical.clone();
        let leg_usd = directive.allocation.leg_usd;

        if spread.long_mark_price <= 0.0 || spread.short_mark_price <= 0.0 {
            let exchange = if spread.long_mark_price <= 0.0 {
                spread.long_exchange
            } else {
                spread.short_exchange
            };
            return Err(Box::new(EngineError::MarketData {
                exchange,
                symbol: canonical,
                detail: "mark price unavailable".to_string(),
            }));
        }

        let long_symbol = mapping.symbol_on(spread.long_exchange).to_string();
        let short_symbol = mapping.symbol_on(spread.short_exchange).to_string();
        let long_qty = leg_usd / spread.long_mark_price;
        let short_qty = leg_usd / spread.short_mark_price;

        let long_venue = self.venue(spread.long_exchange)?;
        let short_venue = self.venue(spread.short_exchange)?;

        let long_request = OrderRequest::market(&long_symbol, OrderSide::Buy, long_qty);
        let long_receipt = match long_venue.orders.place_order(&long_request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.orders_failed_total.inc();
                }
                self.emit(
                    StrategyEvent::new(
                        EventLevel::Error,
                        EventKind::Order,
                        format!(
                            "entry aborted: long leg {} {} on {} failed: {}",
                            long_symbol, leg_usd, spread.long_exchange, e
                        ),
                    )
                    .with_canonical(&canonical),
                );
                return Err(Box::new(EngineError::OrderExecution {
                    exchange: spread.long_exchange,
                    symbol: long_symbol,
                    side: OrderSide::Buy,
                    detail: e.to_string(),
                }));
            }
        };

        let short_request = OrderRequest::market(&short_symbol, OrderSide::Sell, short_qty);
        let short_receipt = match short_venue.orders.place_order(&short_request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.orders_failed_total.inc();
                }
                // Never leave a one-sided position behind: unwind the
                // filled long leg before reporting the failure.
                let unwind = OrderRequest::market(&long_symbol, OrderSide::Sell, long_qty);
                match long_venue.orders.place_order(&unwind).await {
                    Ok(_) => {
                        self.emit(
                            StrategyEvent::new(
                                EventLevel::Error,
                                EventKind::Order,
                                format!(
                                    "entry aborted: short leg {} on {} failed ({}), long leg unwound",
                                    short_symbol, spread.short_exchange, e
                                ),
                            )
                            .with_canonical(&canonical),
                        );
                    }
                    Err(unwind_err) => {
                        self.emit(
                            StrategyEvent::new(
                                EventLevel::Error,
                                EventKind::Order,
                                format!(
                                    "entry aborted: short leg {} on {} failed ({}) and long-leg unwind on {} also failed ({}): manual reconciliation required",
                                    short_symbol,
                                    spread.short_exchange,
                                    e,
                                    spread.long_exchange,
                                    unwind_err
                                ),
                            )
                            .with_canonical(&canonical),
                        );
                    }
                }
                return Err(Box::new(EngineError::OrderExecution {
                    exchange: spread.short_exchange,
                    symbol: short_symbol,
                    side: OrderSide::Sell,
                    detail: e.to_string(),
                }));
            }
        };

        let now = Utc::now();
        let long_next_funding = snapshots
            .get(&spread.long_exchange)
            .and_then(|s| s.rate(&long_symbol))
            .and_then(|r| r.next_funding_time);
        let short_next_funding = snapshots
            .get(&spread.short_exchange)
            .and_then(|s| s.rate(&short_symbol))
            .and_then(|r| r.next_funding_time);

        let entry_spread = spread.oriented_annual_spread();
        let position = StrategyPosition {
            id: Uuid::new_v4(),
            canonical: canonical.clone(),
            rank: directive.rank,
            allocation_pct: directive.allocation.pct,
            long: PositionLeg {
                exchange: spread.long_exchange,
                symbol: long_symbol,
                size_usd: leg_usd,
                quantity: long_qty,
                entry_price: long_receipt.fill_price.unwrap_or(spread.long_mark_price),
                mark_price: spread.long_mark_price,
                next_funding_time: long_next_funding,
                current_rate: spread.long_rate,
                closed: false,
            },
            short: PositionLeg {
                exchange: spread.short_exchange,
                symbol: short_symbol,
                size_usd: leg_usd,
                quantity: short_qty,
                entry_price: short_receipt.fill_price.unwrap_or(spread.short_mark_price),
                mark_price: spread.short_mark_price,
                next_funding_time: short_next_funding,
                current_rate: spread.short_rate,
                closed: false,
            },
            entry_spread,
            current_spread: entry_spread,
            entry_time: now,
            exit_time: None,
            funding_earned: 0.0,
            pnl: 0.0,
            status: PositionStatus::Open,
            close_reason: None,
        };

        if let Some(ref metrics) = self.metrics {
            metrics.positions_opened_total.inc();
            metrics.open_positions.set(self.open.len() as i64 + 1);
        }
        self.emit(
            StrategyEvent::new(
                EventLevel::Success,
                EventKind::Entry,
                format!(
                    "opened rank {} position: long {} / short {} at {:.2}% APR, ${:.2} per leg",
                    directive.rank,
                    spread.long_exchange,
                    spread.short_exchange,
                    entry_spread * 100.0,
                    leg_usd
                ),
            )
            .with_canonical(&canonical),
        );
        info!(
            canonical = %canonical,
            rank = directive.rank,
            leg_usd = leg_usd,
            "PositionManager: opened position for {} (rank {})",
            canonical,
            directive.rank
        );

        self.open.push(position.clone());
        Ok(position)
    }

    /// Refresh marks, accrue funding on elapsed settlement deadlines, and
    /// recompute P&L for every open position.
    pub fn tick(&mut self, snapshots: &HashMap<ExchangeId, VenueSnapshot>) {
        for position in &mut self.open {
            let accrued = accrue_leg(&mut position.long, snapshots, false)
                + accrue_leg(&mut position.short, snapshots, true);
            position.funding_earned += accrued;
            position.current_spread = position.short.exchange.annualize(position.short.current_rate)
                - position.long.exchange.annualize(position.long.current_rate);
            position.pnl = position.mark_to_market();
        }

        if let Some(ref metrics) = self.metrics {
            metrics.open_positions.set(self.open.len() as i64);
            metrics
                .allocated_capital_usd
                .set(self.allocated_usd());
            metrics.funding_earned_usd.set(self.open_funding_usd());
        }
    }

    /// Close one position, retrying each failing closing leg.
    ///
    /// On partial failure the position stays in the open list with status
    /// `Closing` so the residual exposure is never silently lost; the
    /// next close attempt (manual or scheduled) skips legs that already
    /// unwound.
    pub async fn close_position(
        &mut self,
        id: Uuid,
        reason: CloseReason,
    ) -> Result<StrategyPosition, Box<dyn std::error::Error + Send + Sync>> {
        let index = self.open.iter().position(|p| p.id == id).ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("position {} is not open", id),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        self.open[index].status = PositionStatus::Closing;
        self.open[index].close_reason = Some(reason);
        let canonical = self.open[index].canonical.clone();

        let mut failures: Vec<String> = Vec::new();

        let (long_exchange, long_symbol, long_qty, long_closed) = {
            let leg = &self.open[index].long;
            (leg.exchange, leg.symbol.clone(), leg.quantity, leg.closed)
        };
        if !long_closed {
            let venue = self.venue(long_exchange)?;
            let request = OrderRequest::market(&long_symbol, OrderSide::Sell, long_qty);
            match place_with_retry(venue.orders.clone(), request).await {
                Ok(_) => self.open[index].long.closed = true,
                Err(e) => {
                    if let Some(ref metrics) = self.metrics {
                        metrics.orders_failed_total.inc();
                    }
                    failures.push(format!("sell {} on {}: {}", long_symbol, long_exchange, e));
                }
            }
        }

        let (short_exchange, short_symbol, short_qty, short_closed) = {
            let leg = &self.open[index].short;
            (leg.exchange, leg.symbol.clone(), leg.quantity, leg.closed)
        };
        if !short_closed {
            let venue = self.venue(short_exchange)?;
            let request = OrderRequest::market(&short_symbol, OrderSide::Buy, short_qty);
            match place_with_retry(venue.orders.clone(), request).await {
                Ok(_) => self.open[index].short.closed = true,
                Err(e) => {
                    if let Some(ref metrics) = self.metrics {
                        metrics.orders_failed_total.inc();
                    }
                    failures.push(format!("buy {} on {}: {}", short_symbol, short_exchange, e));
                }
            }
        }

        if !failures.is_empty() {
            let detail = failures.join("; ");
            self.emit(
                StrategyEvent::new(
                    EventLevel::Error,
                    EventKind::Order,
                    format!(
                        "close incomplete, residual exposure remains ({}): manual reconciliation required",
                        detail
                    ),
                )
                .with_canonical(&canonical),
            );
            return Err(Box::new(std::io::Error::other(format!(
                "failed to close position {}: {}",
                canonical, detail
            ))));
        }

        let mut position = self.open.remove(index);
        position.status = PositionStatus::Closed;
        position.exit_time = Some(Utc::now());
        position.pnl = position.mark_to_market();

        if let Some(ref metrics) = self.metrics {
            metrics.positions_closed_total.inc();
            metrics.open_positions.set(self.open.len() as i64);
        }
        self.emit(
            StrategyEvent::new(
                EventLevel::Success,
                EventKind::Exit,
                format!(
                    "closed position ({:?}): pnl ${:.2}, funding ${:.2}",
                    reason, position.pnl, position.funding_earned
                ),
            )
            .with_canonical(&canonical),
        );

        self.closed.push(position.clone());
        Ok(position)
    }

    /// Force-close everything, spread signs notwithstanding. Failures are
    /// reported per position and the sweep continues.
    pub async fn force_close_all(&mut self, reason: CloseReason) -> Vec<StrategyPosition> {
        let ids: Vec<Uuid> = self.open.iter().map(|p| p.id).collect();
        let mut closed = Vec::new();
        for id in ids {
            match self.close_position(id, reason).await {
                Ok(position) => closed.push(position),
                Err(e) => {
                    warn!(position_id = %id, error = %e, "PositionManager: force close failed for {}", id);
                }
            }
        }
        closed
    }
}

/// Refresh one leg from the venue snapshot and return the funding accrued
/// if the settlement deadline has passed. `receives` is true for the
/// short leg (it collects positive funding), false for the long leg (it
/// pays).
fn accrue_leg(
    leg: &mut PositionLeg,
    snapshots: &HashMap<ExchangeId, VenueSnapshot>,
    receives: bool,
) -> f64 {
    let Some(snapshot) = snapshots.get(&leg.exchange) else {
        return 0.0;
    };
    let Some(rate) = snapshot.rate(&leg.symbol) else {
        return 0.0;
    };

    leg.mark_price = rate.mark_price;

    let mut accrued = 0.0;
    if let Some(due) = leg.next_funding_time {
        if snapshot.taken_at >= due {
            // Settle with the rate observed for the elapsed period before
            // adopting the fresh one.
            let payment = leg.size_usd * leg.current_rate;
            accrued = if receives { payment } else { -payment };
            leg.next_funding_time = match rate.next_funding_time {
                Some(next) if next > due => Some(next),
                _ => None,
            };
        }
    } else {
        // Only adopt deadlines that are still ahead; a stale snapshot
        // must not re-trigger a settlement that was already accrued.
        leg.next_funding_time = rate.next_funding_time.filter(|t| *t > snapshot.taken_at);
    }

    leg.current_rate = rate.rate;
    accrued
}

async fn place_with_retry(
    gateway: Arc<dyn OrderGateway>,
    request: OrderRequest,
) -> Result<OrderReceipt, Box<dyn std::error::Error + Send + Sync>> {
    (|| {
        let gateway = gateway.clone();
        let request = request.clone();
        async move { gateway.place_order(&request).await }
    })
    .retry(
        ExponentialBuilder::default()
            .with_max_times(CLOSE_RETRY_ATTEMPTS)
            .with_min_delay(CLOSE_RETRY_MIN_DELAY),
    )
    .notify(|err, delay| {
        warn!(
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "PositionManager: retrying closing order in {:?}",
            delay
        );
    })
    .await
}
