//! Shared data models spanning the engine layers.

pub mod error;
pub mod event;
pub mod funding;
pub mod position;
pub mod strategy;

pub use error::{EngineError, OrderSide};
pub use event::{EventKind, EventLevel, EventSink, MemoryEventSink, StrategyEvent, TracingEventSink};
pub use funding::{
    AssetMapping, AssetMeta, ExchangeId, FundingRate, FundingSpread, VenueSnapshot,
};
pub use position::{CloseReason, PositionLeg, PositionStatus, StrategyPosition};
pub use strategy::{SpreadExitMode, StrategyConfig, ALLOCATION_SUM_TOLERANCE};
