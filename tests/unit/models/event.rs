//! Unit tests for the event sink buffers

use arbitrix::models::event::{
    EventKind, EventLevel, EventSink, MemoryEventSink, StrategyEvent,
};

fn event(message: &str) -> StrategyEvent {
    StrategyEvent::new(EventLevel::Info, EventKind::Rebalance, message)
}

#[test]
fn buffers_events_in_order() {
    let sink = MemoryEventSink::new(10);
    sink.emit(event("first"));
    sink.emit(event("second"));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message, "first");
    assert_eq!(events[1].message, "second");
}

#[test]
fn capacity_drops_oldest_first() {
    let sink = MemoryEventSink::new(2);
    sink.emit(event("a"));
    sink.emit(event("b"));
    sink.emit(event("c"));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message, "b");
    assert_eq!(events[1].message, "c");
}

#[test]
fn drain_empties_the_buffer() {
    let sink = MemoryEventSink::new(10);
    sink.emit(event("a"));
    sink.emit(event("b"));

    let drained = sink.drain();
    assert_eq!(drained.len(), 2);
    assert!(sink.events().is_empty());
}

#[test]
fn canonical_attaches_to_events() {
    let tagged = event("entry").with_canonical("BTC");
    assert_eq!(tagged.canonical.as_deref(), Some("BTC"));
}
