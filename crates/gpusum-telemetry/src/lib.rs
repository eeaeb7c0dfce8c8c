//! # gpusum-telemetry
//!
//! Structured harness events (inventory, selection, allocation, build,
//! pipeline steps, validation) delivered through an [`EventBus`] to
//! pluggable sinks, plus the process-wide `tracing` subscriber setup.

pub mod bus;
pub mod events;
pub mod logging;
pub mod sinks;

pub use bus::EventBus;
pub use events::{EventKind, HarnessEvent};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use sinks::{EventLog, EventSink, JsonLinesSink, TracingSink, VecSink};
