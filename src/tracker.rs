//! Multi-sink telemetry fan-out (component E).
//!
//! A [`Tracker`] is a multicast channel: sinks are called in registration
//! order and a panicking/failing sink is isolated so it can never block (or
//! take down) the others. `category` is an open string set; `hyperota` is
//! the one this crate emits its own lifecycle events under (`lifecycle` is
//! reserved for future use by embedding hosts that want a second channel).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;

pub const CATEGORY_HYPEROTA: &str = "hyperota";
pub const SUBCATEGORY_APPL_MANAGER: &str = "APPL_MANAGER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One telemetry event, matching the original `trackEventWithLevel:label:key:value:category:subcategory:` shape.
#[derive(Debug, Clone)]
pub struct Event {
    pub level: Level,
    pub label: String,
    pub key: String,
    pub value: Value,
    pub category: String,
    pub subcategory: String,
}

impl Event {
    pub fn lifecycle(level: Level, label: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            level,
            label: label.into(),
            key: key.into(),
            value,
            category: CATEGORY_HYPEROTA.into(),
            subcategory: SUBCATEGORY_APPL_MANAGER.into(),
        }
    }
}

/// A telemetry destination. Implementors should not panic; if they do, the
/// panic is caught so other sinks still run (see [`Tracker::event`]).
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Forwards every event into `tracing`, at a level matching [`Level`].
///
/// Registered by default on every manager so host telemetry built on
/// `tracing-subscriber` observes engine activity without any setup.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &Event) {
        match event.level {
            Level::Info => tracing::info!(
                label = %event.label,
                key = %event.key,
                value = %event.value,
                category = %event.category,
                subcategory = %event.subcategory,
                "ota event"
            ),
            Level::Warning => tracing::warn!(
                label = %event.label,
                key = %event.key,
                value = %event.value,
                category = %event.category,
                subcategory = %event.subcategory,
                "ota event"
            ),
            Level::Error => tracing::error!(
                label = %event.label,
                key = %event.key,
                value = %event.value,
                category = %event.category,
                subcategory = %event.subcategory,
                "ota event"
            ),
        }
    }
}

/// Fans events out to every registered sink, in registration order.
#[derive(Clone, Default)]
pub struct Tracker {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self { sinks: vec![Arc::new(TracingSink)] }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn event(&self, event: Event) {
        for sink in &self.sinks {
            let sink = sink.clone();
            let event_ref = &event;
            if catch_unwind(AssertUnwindSafe(|| sink.on_event(event_ref))).is_err() {
                tracing::error!("tracker sink panicked and was isolated");
            }
        }
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").field("sinks", &self.sinks.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<String>>);

    impl EventSink for RecordingSink {
        fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.key.clone());
        }
    }

    struct PanickingSink;
    impl EventSink for PanickingSink {
        fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn fans_out_to_all_sinks_in_order() {
        let mut tracker = Tracker::new();
        let recorder = Arc::new(RecordingSink(Mutex::new(vec![])));
        tracker.add_sink(recorder.clone());
        tracker.event(Event::lifecycle(Level::Info, "RELEASE_CONFIG", "fetched", Value::Null));
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &["fetched".to_string()]);
    }

    #[test]
    fn a_panicking_sink_does_not_block_others() {
        let mut tracker = Tracker::new();
        tracker.add_sink(Arc::new(PanickingSink));
        let recorder = Arc::new(RecordingSink(Mutex::new(vec![])));
        tracker.add_sink(recorder.clone());
        tracker.event(Event::lifecycle(Level::Error, "BOOT_TIMEOUT", "fired", Value::Null));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
