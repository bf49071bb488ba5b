//! The strategy service: single owner of config and position state.
//!
//! The UI/API layer only reads snapshots and enqueues commands; every
//! mutation of position state goes through this service. There is no true
//! parallelism to guard against, but re-entrancy is: a rebalance never
//! starts while another is in flight, and manual rebalances honor a
//! cooldown window.

use crate::engine::allocation::AllocationEngine;
use crate::engine::plan::RebalancePlanner;
use crate::engine::selector::{RankedSelector, SkippedCandidate};
use crate::engine::spread::SpreadCalculator;
use crate::exchanges::VenueHandle;
use crate::metrics::Metrics;
use crate::models::error::EngineError;
use crate::models::event::{
    EventKind, EventLevel, EventSink, MemoryEventSink, StrategyEvent, TracingEventSink,
};
use crate::models::funding::{AssetMeta, ExchangeId, VenueSnapshot};
use crate::models::position::{CloseReason, StrategyPosition};
use crate::models::strategy::StrategyConfig;
use crate::positions::PositionManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// How many recent events the status snapshot carries.
const EVENT_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceTrigger {
    Start,
    Timer,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceStatus {
    Completed,
    Skipped,
}

/// What one rebalance cycle did. Serializable: travels through the job
/// queue to the persistence stage and into the cached status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub trigger: RebalanceTrigger,
    pub status: RebalanceStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub selected: usize,
    pub opened: usize,
    pub closed: usize,
    pub held: usize,
    pub warnings: Vec<String>,
    pub skipped_candidates: Vec<SkippedCandidate>,
    pub closed_positions: Vec<StrategyPosition>,
}

impl RebalanceOutcome {
    fn skipped(trigger: RebalanceTrigger, warning: impl Into<String>) -> Self {
        Self {
            trigger,
            status: RebalanceStatus::Skipped,
            started_at: Utc::now(),
            duration_ms: 0,
            selected: 0,
            opened: 0,
            closed: 0,
            held: 0,
            warnings: vec![warning.into()],
            skipped_candidates: Vec::new(),
            closed_positions: Vec::new(),
        }
    }
}

/// Read-only view of the service for the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub config: StrategyConfig,
    pub open_positions: Vec<StrategyPosition>,
    pub closed_count: usize,
    pub allocated_usd: f64,
    pub funding_earned_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RebalanceOutcome>,
    pub recent_events: Vec<StrategyEvent>,
    pub updated_at: DateTime<Utc>,
}

pub struct StrategyService {
    config: RwLock<StrategyConfig>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    manager: Mutex<PositionManager>,
    venues: HashMap<ExchangeId, VenueHandle>,
    /// Held for the duration of a cycle; `try_lock` failure means a
    /// rebalance is already in flight.
    rebalance_gate: Mutex<()>,
    last_manual: RwLock<Option<Instant>>,
    last_outcome: RwLock<Option<RebalanceOutcome>>,
    /// Recent events for the status API.
    events: Arc<MemoryEventSink>,
    /// Events awaiting persistence; drained by the persist job.
    pending_events: Arc<MemoryEventSink>,
    sinks: Vec<Arc<dyn EventSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl StrategyService {
    /// Build a service over the given venue handles. The config is
    /// validated here, before anything can trade.
    pub fn new(
        config: StrategyConfig,
        venues: Vec<VenueHandle>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let events = Arc::new(MemoryEventSink::new(EVENT_BUFFER_CAPACITY));
        let pending_events = Arc::new(MemoryEventSink::new(EVENT_BUFFER_CAPACITY));
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(TracingEventSink),
            events.clone(),
            pending_events.clone(),
        ];

        let mut manager = PositionManager::new(venues.clone());
        for sink in &sinks {
            manager = manager.with_sink(sink.clone());
        }
        if let Some(ref metrics) = metrics {
            manager = manager.with_metrics(metrics.clone());
        }

        Ok(Self {
            config: RwLock::new(config),
            started_at: RwLock::new(None),
            manager: Mutex::new(manager),
            venues: venues.into_iter().map(|v| (v.id, v)).collect(),
            rebalance_gate: Mutex::new(()),
            last_manual: RwLock::new(None),
            last_outcome: RwLock::new(None),
            events,
            pending_events,
            sinks,
            metrics,
        })
    }

    fn emit(&self, event: StrategyEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }

    pub async fn is_running(&self) -> bool {
        self.started_at.read().await.is_some()
    }

    pub async fn config(&self) -> StrategyConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration. Only allowed while the strategy is
    /// stopped; the snapshot is cloned, the caller's copy is untouched.
    pub async fn update_config(&self, new_config: StrategyConfig) -> Result<(), EngineError> {
        if self.is_running().await {
            return Err(EngineError::Configuration(
                "configuration can only be changed while the strategy is stopped".to_string(),
            ));
        }
        new_config.validate()?;
        *self.config.write().await = new_config;
        self.emit(StrategyEvent::new(
            EventLevel::Info,
            EventKind::Validation,
            "strategy configuration updated",
        ));
        Ok(())
    }

    /// Fetch fresh funding snapshots from every venue.
    pub async fn refresh_snapshots(
        &self,
    ) -> Result<HashMap<ExchangeId, VenueSnapshot>, Box<dyn std::error::Error + Send + Sync>> {
        let mut snapshots = HashMap::new();
        for (id, venue) in &self.venues {
            let snapshot = venue.feed.funding_snapshot().await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "funding snapshot from {} failed: {}",
                    id, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
            snapshots.insert(*id, snapshot);
        }
        Ok(snapshots)
    }

    /// Validate config, mark the strategy running, and open the initial
    /// batch.
    pub async fn start(
        &self,
    ) -> Result<RebalanceOutcome, Box<dyn std::error::Error + Send + Sync>> {
        if self.is_running().await {
            return Err(Box::new(EngineError::Configuration(
                "strategy is already running".to_string(),
            )));
        }
        self.config.read().await.validate()?;

        *self.started_at.write().await = Some(Utc::now());
        self.emit(StrategyEvent::new(
            EventLevel::Info,
            EventKind::Rebalance,
            "strategy started",
        ));

        let result = match self.refresh_snapshots().await {
            Ok(snapshots) => {
                self.rebalance_with(RebalanceTrigger::Start, &snapshots)
                    .await
            }
            Err(e) => Err(e),
        };
        if result.is_err() {
            // Failed starts do not leave a half-running strategy behind.
            *self.started_at.write().await = None;
        }
        result
    }

    /// Force-close everything and halt. Positions are closed regardless
    /// of spread sign.
    pub async fn stop(
        &self,
    ) -> Result<Vec<StrategyPosition>, Box<dyn std::error::Error + Send + Sync>> {
        if !self.is_running().await {
            return Ok(Vec::new());
        }

        // Waits out any in-flight rebalance so we never close underneath
        // an entry in progress.
        let _gate = self.rebalance_gate.lock().await;
        *self.started_at.write().await = None;

        let mut manager = self.manager.lock().await;
        let closed = manager.force_close_all(CloseReason::Shutdown).await;
        self.emit(StrategyEvent::new(
            EventLevel::Info,
            EventKind::Rebalance,
            format!("strategy stopped, {} positions force-closed", closed.len()),
        ));
        Ok(closed)
    }

    /// Fetch fresh snapshots and run one cycle.
    pub async fn rebalance(
        &self,
        trigger: RebalanceTrigger,
    ) -> Result<RebalanceOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let snapshots = self.refresh_snapshots().await?;
        self.rebalance_with(trigger, &snapshots).await
    }

    /// Run one evaluation cycle against the supplied snapshots.
    pub async fn rebalance_with(
        &self,
        trigger: RebalanceTrigger,
        snapshots: &HashMap<ExchangeId, VenueSnapshot>,
    ) -> Result<RebalanceOutcome, Box<dyn std::error::Error + Send + Sync>> {
        if !self.is_running().await && trigger != RebalanceTrigger::Start {
            return Ok(self.record_skip(trigger, "strategy is not running").await);
        }

        if trigger == RebalanceTrigger::Manual {
            let cooldown_secs = self.config.read().await.manual_cooldown_secs;
            let last_manual = *self.last_manual.read().await;
            if let Some(last) = last_manual {
                let elapsed = last.elapsed().as_secs();
                if elapsed < cooldown_secs {
                    return Ok(self
                        .record_skip(
                            trigger,
                            format!(
                                "manual rebalance on cooldown for another {}s",
                                cooldown_secs - elapsed
                            ),
                        )
                        .await);
                }
            }
        }

        let Ok(_gate) = self.rebalance_gate.try_lock() else {
            return Ok(self
                .record_skip(trigger, "a rebalance is already in flight")
                .await);
        };

        if trigger == RebalanceTrigger::Manual {
            *self.last_manual.write().await = Some(Instant::now());
        }

        let cycle_start = Instant::now();
        let started_at = Utc::now();
        let config = self.config.read().await.clone();

        let calculator = SpreadCalculator::new(config.mappings.clone());
        let selector = RankedSelector::from_config(&config);
        let allocator = AllocationEngine::from_config(&config)?;
        let planner = RebalancePlanner::new(config.exit_mode, config.min_spread_threshold());

        let (snap_a, snap_b) = match (
            snapshots.get(&ExchangeId::Aster),
            snapshots.get(&ExchangeId::Hyperliquid),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "rebalance requires snapshots from both venues",
                )))
            }
        };

        let spreads = calculator.compute(snap_a, snap_b);
        let meta = canonical_meta(&config, snapshots);
        let report = selector.select(spreads, &meta);
        let allocations = allocator.size(report.selected.len());

        let mut warnings = Vec::new();
        if let Some(ref warning) = report.shortfall_warning {
            warnings.push(warning.clone());
            self.emit(
                StrategyEvent::new(EventLevel::Warning, EventKind::Validation, warning.clone()),
            );
        }

        let mut manager = self.manager.lock().await;
        manager.tick(snapshots);

        let plan = planner.plan(&manager.open_positions(), &report.selected, &allocations);
        let held = plan.hold.len();

        let mut closed_positions = Vec::new();
        for directive in &plan.close {
            match manager
                .close_position(directive.position_id, directive.reason)
                .await
            {
                Ok(position) => closed_positions.push(position),
                Err(e) => {
                    warnings.push(format!("close of {} failed: {}", directive.canonical, e));
                }
            }
        }

        let mut opened = 0;
        if !plan.open.is_empty() {
            match self.pretrade_check(&config, &plan.open).await {
                Ok(()) => {
                    for directive in &plan.open {
                        let Some(mapping) = config.mapping(&directive.spread.canonical) else {
                            warnings.push(format!(
                                "no mapping for {} at entry time",
                                directive.spread.canonical
                            ));
                            continue;
                        };
                        match manager.open_position(directive, mapping, snapshots).await {
                            Ok(_) => opened += 1,
                            Err(e) => {
                                warnings.push(format!(
                                    "entry for {} failed: {}",
                                    directive.spread.canonical, e
                                ));
                            }
                        }
                    }
                }
                Err(reason) => {
                    warnings.push(reason.clone());
                    self.emit(StrategyEvent::new(
                        EventLevel::Warning,
                        EventKind::Validation,
                        reason,
                    ));
                }
            }
        }
        drop(manager);

        let duration = cycle_start.elapsed();
        let outcome = RebalanceOutcome {
            trigger,
            status: RebalanceStatus::Completed,
            started_at,
            duration_ms: duration.as_millis() as u64,
            selected: report.selected.len(),
            opened,
            closed: closed_positions.len(),
            held,
            warnings,
            skipped_candidates: report.skipped,
            closed_positions,
        };

        if let Some(ref metrics) = self.metrics {
            metrics.rebalances_total.inc();
            metrics
                .rebalance_duration_seconds
                .observe(duration.as_secs_f64());
        }
        self.emit(StrategyEvent::new(
            EventLevel::Info,
            EventKind::Rebalance,
            format!(
                "rebalance ({:?}) complete: {} selected, {} opened, {} closed, {} held",
                trigger, outcome.selected, outcome.opened, outcome.closed, outcome.held
            ),
        ));
        info!(
            trigger = ?trigger,
            selected = outcome.selected,
            opened = outcome.opened,
            closed = outcome.closed,
            held = outcome.held,
            duration_ms = outcome.duration_ms,
            "StrategyService: rebalance complete"
        );

        *self.last_outcome.write().await = Some(outcome.clone());
        Ok(outcome)
    }

    async fn record_skip(
        &self,
        trigger: RebalanceTrigger,
        warning: impl Into<String>,
    ) -> RebalanceOutcome {
        let warning = warning.into();
        warn!(trigger = ?trigger, "StrategyService: rebalance skipped: {}", warning);
        self.emit(StrategyEvent::new(
            EventLevel::Warning,
            EventKind::Rebalance,
            warning.clone(),
        ));
        if let Some(ref metrics) = self.metrics {
            metrics.rebalances_skipped_total.inc();
        }
        let outcome = RebalanceOutcome::skipped(trigger, warning);
        *self.last_outcome.write().await = Some(outcome.clone());
        outcome
    }

    /// Balance pre-check: each venue must hold enough free USD for the
    /// legs about to be placed on it. Validation only: sizing never
    /// derives from balances.
    async fn pretrade_check(
        &self,
        config: &StrategyConfig,
        opens: &[crate::engine::plan::OpenDirective],
    ) -> Result<(), String> {
        let mut required: HashMap<ExchangeId, f64> = HashMap::new();
        for directive in opens {
            *required.entry(directive.spread.long_exchange).or_default() +=
                directive.allocation.leg_usd;
            *required.entry(directive.spread.short_exchange).or_default() +=
                directive.allocation.leg_usd;
        }

        if config.dry_run {
            return Ok(());
        }

        for (exchange, needed) in required {
            let Some(venue) = self.venues.get(&exchange) else {
                return Err(format!("no venue handle registered for {}", exchange));
            };
            let available = venue
                .balance
                .available_usd()
                .await
                .map_err(|e| format!("balance query on {} failed: {}", exchange, e))?;
            if available < needed {
                return Err(format!(
                    "insufficient balance on {}: ${:.2} available, ${:.2} required",
                    exchange, available, needed
                ));
            }
        }
        Ok(())
    }

    /// Close one open position by canonical asset.
    pub async fn close_by_canonical(
        &self,
        canonical: &str,
    ) -> Result<Option<StrategyPosition>, Box<dyn std::error::Error + Send + Sync>> {
        let mut manager = self.manager.lock().await;
        let id = manager
            .open_positions()
            .iter()
            .find(|p| p.canonical == canonical)
            .map(|p| p.id);
        match id {
            Some(id) => manager
                .close_position(id, CloseReason::Manual)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Read-only snapshot for the API and the status cache.
    pub async fn status(&self) -> StatusSnapshot {
        let manager = self.manager.lock().await;
        StatusSnapshot {
            running: self.is_running().await,
            started_at: *self.started_at.read().await,
            config: self.config.read().await.clone(),
            open_positions: manager.open_positions(),
            closed_count: manager.closed_positions().len(),
            allocated_usd: manager.allocated_usd(),
            funding_earned_usd: manager.open_funding_usd(),
            last_outcome: self.last_outcome.read().await.clone(),
            recent_events: self.events.events(),
            updated_at: Utc::now(),
        }
    }

    /// Events buffered since the last persistence pass.
    pub fn drain_pending_events(&self) -> Vec<StrategyEvent> {
        self.pending_events.drain()
    }
}

/// Merge per-venue symbol metadata into canonical-asset metadata. Day
/// volume takes the smaller side: the thinner venue bounds what the pair
/// can actually trade.
fn canonical_meta(
    config: &StrategyConfig,
    snapshots: &HashMap<ExchangeId, VenueSnapshot>,
) -> HashMap<String, AssetMeta> {
    let mut merged = HashMap::new();
    for mapping in &config.mappings {
        let mut combined = AssetMeta::default();
        for (exchange, snapshot) in snapshots {
            let Some(meta) = snapshot.meta.get(mapping.symbol_on(*exchange)) else {
                continue;
            };
            if combined.market_cap_usd.is_none() {
                combined.market_cap_usd = meta.market_cap_usd;
            }
            combined.day_volume_usd = match (combined.day_volume_usd, meta.day_volume_usd) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        merged.insert(mapping.canonical.clone(), combined);
    }
    merged
}
