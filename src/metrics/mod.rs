//! Prometheus metrics for the strategy engine and HTTP surface.

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,

    // HTTP surface
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,

    // Strategy engine
    pub rebalances_total: IntCounter,
    pub rebalances_skipped_total: IntCounter,
    pub rebalance_duration_seconds: Histogram,
    pub positions_opened_total: IntCounter,
    pub positions_closed_total: IntCounter,
    pub orders_failed_total: IntCounter,
    pub open_positions: IntGauge,
    pub allocated_capital_usd: Gauge,
    pub funding_earned_usd: Gauge,

    // Connections
    pub database_connected: Gauge,
    pub cache_connected: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounter::with_opts(Opts::new(
            "http_requests_total",
            "Total HTTP requests served",
        ))?;
        let http_requests_in_flight = IntGauge::with_opts(Opts::new(
            "http_requests_in_flight",
            "HTTP requests currently being served",
        ))?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;

        let rebalances_total = IntCounter::with_opts(Opts::new(
            "rebalances_total",
            "Completed rebalance cycles",
        ))?;
        let rebalances_skipped_total = IntCounter::with_opts(Opts::new(
            "rebalances_skipped_total",
            "Rebalances skipped by the cooldown or in-progress guard",
        ))?;
        let rebalance_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "rebalance_duration_seconds",
            "Rebalance cycle duration in seconds",
        ))?;
        let positions_opened_total = IntCounter::with_opts(Opts::new(
            "positions_opened_total",
            "Delta-neutral positions opened",
        ))?;
        let positions_closed_total = IntCounter::with_opts(Opts::new(
            "positions_closed_total",
            "Delta-neutral positions closed",
        ))?;
        let orders_failed_total = IntCounter::with_opts(Opts::new(
            "orders_failed_total",
            "Order legs that failed at a venue",
        ))?;
        let open_positions = IntGauge::with_opts(Opts::new(
            "open_positions",
            "Currently open positions",
        ))?;
        let allocated_capital_usd = Gauge::with_opts(Opts::new(
            "allocated_capital_usd",
            "USD notional currently deployed across open positions",
        ))?;
        let funding_earned_usd = Gauge::with_opts(Opts::new(
            "funding_earned_usd",
            "Cumulative net funding across open positions in USD",
        ))?;

        let database_connected = Gauge::with_opts(Opts::new(
            "database_connected",
            "QuestDB connection status (1 = connected)",
        ))?;
        let cache_connected = Gauge::with_opts(Opts::new(
            "cache_connected",
            "Redis connection status (1 = connected)",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(rebalances_total.clone()))?;
        registry.register(Box::new(rebalances_skipped_total.clone()))?;
        registry.register(Box::new(rebalance_duration_seconds.clone()))?;
        registry.register(Box::new(positions_opened_total.clone()))?;
        registry.register(Box::new(positions_closed_total.clone()))?;
        registry.register(Box::new(orders_failed_total.clone()))?;
        registry.register(Box::new(open_positions.clone()))?;
        registry.register(Box::new(allocated_capital_usd.clone()))?;
        registry.register(Box::new(funding_earned_usd.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;
        registry.register(Box::new(cache_connected.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
            rebalances_total,
            rebalances_skipped_total,
            rebalance_duration_seconds,
            positions_opened_total,
            positions_closed_total,
            orders_failed_total,
            open_positions,
            allocated_capital_usd,
            funding_earned_usd,
            database_connected,
            cache_connected,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).map_err(|e| {
            Box::new(std::io::Error::other(format!("metrics encoding failed: {}", e)))
                as Box<dyn std::error::Error + Send + Sync>
        })?;
        String::from_utf8(buffer).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("metrics buffer was not UTF-8: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}
