//! Event bus: broadcast-style event dispatch with pluggable sinks.
//!
//! The bus uses `std::sync::mpsc` so events can be emitted through a
//! shared reference. Sinks are registered once at initialization and
//! receive events when the bus is flushed.

use std::sync::mpsc;
use std::time::Instant;

use crate::events::{EventKind, HarnessEvent};
use crate::sinks::EventSink;

/// Broadcast event bus for harness telemetry.
///
/// The producer side (`emit`) queues events; `flush` hands every queued
/// event to each registered sink in order.
pub struct EventBus {
    sender: mpsc::Sender<HarnessEvent>,
    receiver: mpsc::Receiver<HarnessEvent>,
    sinks: Vec<Box<dyn EventSink>>,
    /// Whether the bus is active. Disabled bus is a no-op.
    enabled: bool,
    started: Instant,
}

impl EventBus {
    /// Creates a new event bus with no sinks.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            sinks: Vec::new(),
            enabled: true,
            started: Instant::now(),
        }
    }

    /// A bus that drops everything.
    pub fn disabled() -> Self {
        let mut bus = Self::new();
        bus.enabled = false;
        bus
    }

    /// Registers a sink to receive events.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Enables or disables the bus. Disabled bus drops events silently.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit an event, stamped with the time since the bus was created.
    pub fn emit(&self, kind: EventKind) {
        if !self.enabled {
            return;
        }
        let event = HarnessEvent::new(self.started.elapsed().as_secs_f64(), kind);
        // The receiver lives as long as the bus.
        let _ = self.sender.send(event);
    }

    /// Deliver all pending events to registered sinks.
    pub fn flush(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            for sink in &mut self.sinks {
                sink.handle(&event);
            }
        }
    }

    /// Flush, then let every sink finalize.
    pub fn finish(&mut self) {
        self.flush();
        for sink in &mut self.sinks {
            sink.finalize();
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
