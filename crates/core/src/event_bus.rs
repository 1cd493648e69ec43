//! Tracker event bus — trait for dispatching attribution events to the host.
//!
//! The attribution flow accepts an `Arc<dyn EventSink>` and emits
//! `affiliate_id_ready` / `affiliate_referral_ready` through it. A browser
//! host forwards these as DOM events; other hosts log or ignore them.

use crate::types::{TrackerEvent, TrackerEventType};
use std::sync::Arc;

use parking_lot::Mutex;

/// Trait for dispatching tracker events to the embedding host.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TrackerEvent);
}

/// No-op sink for hosts that don't listen for events.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: TrackerEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<TrackerEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: TrackerEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Names of the captured events, in dispatch order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .map(|e| e.name())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: TrackerEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience: create a no-op event bus for hosts that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
