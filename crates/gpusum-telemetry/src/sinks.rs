//! Pluggable event sinks.
//!
//! Sinks consume events from the bus and process them (collect in
//! memory, bridge into `tracing`, write JSON lines).

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{EventKind, HarnessEvent};

/// Trait for event consumers.
///
/// Implement this to create custom telemetry outputs.
pub trait EventSink: Send {
    /// Process a single event.
    fn handle(&mut self, event: &HarnessEvent);

    /// Called when the run ends. Flush buffers, close files, etc.
    fn finalize(&mut self) {}

    /// Returns a human-readable name for this sink.
    fn name(&self) -> &str;
}

/// Shared view of the events a [`VecSink`] has collected.
///
/// Stays readable after the sink has been moved into a bus.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<HarnessEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Event names in arrival order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind.name()).collect()
    }
}

/// A sink that collects events in memory for testing and inspection.
#[derive(Debug, Default)]
pub struct VecSink {
    log: EventLog,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the collected events.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl EventSink for VecSink {
    fn handle(&mut self, event: &HarnessEvent) {
        self.log.events.lock().push(event.clone());
    }

    fn name(&self) -> &str {
        "vec_sink"
    }
}

/// A sink that logs events using the `tracing` crate.
pub struct TracingSink {
    level: tracing::Level,
}

impl TracingSink {
    /// Creates a new tracing sink at the given log level.
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(tracing::Level::DEBUG)
    }
}

impl EventSink for TracingSink {
    fn handle(&mut self, event: &HarnessEvent) {
        let name = event.kind.name();
        let elapsed = event.elapsed;
        let kind = &event.kind;
        match self.level {
            tracing::Level::ERROR => tracing::error!(event = name, elapsed, ?kind, "harness_event"),
            tracing::Level::WARN => tracing::warn!(event = name, elapsed, ?kind, "harness_event"),
            tracing::Level::INFO => tracing::info!(event = name, elapsed, ?kind, "harness_event"),
            tracing::Level::DEBUG => tracing::debug!(event = name, elapsed, ?kind, "harness_event"),
            tracing::Level::TRACE => tracing::trace!(event = name, elapsed, ?kind, "harness_event"),
        }
    }

    fn name(&self) -> &str {
        "tracing_sink"
    }
}

/// Writes one JSON object per event.
pub struct JsonLinesSink {
    writer: Box<dyn Write + Send>,
    /// Only these kinds are written when set.
    filter: Option<fn(&EventKind) -> bool>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            filter: None,
        }
    }

    /// Restrict output to events accepted by `filter`.
    pub fn with_filter(mut self, filter: fn(&EventKind) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl EventSink for JsonLinesSink {
    fn handle(&mut self, event: &HarnessEvent) {
        if self.filter.is_some_and(|accept| !accept(&event.kind)) {
            return;
        }
        let written = serde_json::to_writer(&mut self.writer, event)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write telemetry event");
        }
    }

    fn finalize(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "Failed to flush telemetry sink");
        }
    }

    fn name(&self) -> &str {
        "json_lines_sink"
    }
}
