//! Structured strategy events.
//!
//! The engine reports entries, exits, rebalance outcomes, and validation
//! failures through an explicit sink interface; log output and the event
//! API are consumers, never the channel itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entry,
    Exit,
    Rebalance,
    Validation,
    Order,
    Market,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    pub message: String,
}

impl StrategyEvent {
    pub fn new(level: EventLevel, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            kind,
            canonical: None,
            message: message.into(),
        }
    }

    pub fn with_canonical(mut self, canonical: impl Into<String>) -> Self {
        self.canonical = Some(canonical.into());
        self
    }
}

/// Consumer of strategy events. The service fans out to every registered
/// sink; sinks must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StrategyEvent);
}

/// Sink that forwards events to the tracing subscriber.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: StrategyEvent) {
        let canonical = event.canonical.as_deref().unwrap_or("-");
        match event.level {
            EventLevel::Info | EventLevel::Success => {
                info!(kind = ?event.kind, canonical = %canonical, "{}", event.message);
            }
            EventLevel::Warning => {
                warn!(kind = ?event.kind, canonical = %canonical, "{}", event.message);
            }
            EventLevel::Error => {
                error!(kind = ?event.kind, canonical = %canonical, "{}", event.message);
            }
        }
    }
}

/// Bounded in-memory sink backing the recent-events API and the tests.
pub struct MemoryEventSink {
    events: Mutex<VecDeque<StrategyEvent>>,
    capacity: usize,
}

impl MemoryEventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Snapshot of the buffered events, oldest first.
    pub fn events(&self) -> Vec<StrategyEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Remove and return everything buffered so far, oldest first.
    pub fn drain(&self) -> Vec<StrategyEvent> {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.drain(..).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: StrategyEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }
}
