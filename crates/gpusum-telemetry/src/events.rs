//! Harness event types.
//!
//! Structured events emitted at each stage of a run. Events are
//! lightweight value types that carry just enough data to be useful for
//! monitoring and debugging.

use serde::{Deserialize, Serialize};

/// A harness event.
///
/// Events are stamped with the time since the bus was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessEvent {
    /// Seconds since the bus started.
    pub elapsed: f64,
    /// Event payload.
    pub kind: EventKind,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// Enumeration finished.
    Inventory { platforms: usize, devices: usize },

    /// A device was chosen.
    DeviceSelected {
        name: String,
        version: String,
        platform: String,
    },

    ContextCreated { device: String },

    QueueCreated,

    /// Host or device memory was allocated.
    ResourceAllocated {
        /// Short label, e.g. `host:a` or `device:out`.
        resource: String,
        bytes: usize,
    },

    /// `count` objects of one kind were released.
    ResourceReleased { resource: String, count: usize },

    /// The program build returned, successfully or not.
    BuildFinished {
        status: String,
        /// Lines in the build log.
        log_lines: usize,
    },

    /// One pipeline phase completed.
    PipelineStep {
        step: String,
        seconds: f64,
        bytes: usize,
    },

    /// Host reference computation finished.
    ReferenceFinished { seconds: f64 },

    /// Device and host outputs were compared.
    ValidationFinished {
        matched: bool,
        first_mismatch: Option<usize>,
    },
}

impl EventKind {
    /// Snake-case event name, matching the serialized tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Inventory { .. } => "inventory",
            EventKind::DeviceSelected { .. } => "device_selected",
            EventKind::ContextCreated { .. } => "context_created",
            EventKind::QueueCreated => "queue_created",
            EventKind::ResourceAllocated { .. } => "resource_allocated",
            EventKind::ResourceReleased { .. } => "resource_released",
            EventKind::BuildFinished { .. } => "build_finished",
            EventKind::PipelineStep { .. } => "pipeline_step",
            EventKind::ReferenceFinished { .. } => "reference_finished",
            EventKind::ValidationFinished { .. } => "validation_finished",
        }
    }
}

impl HarnessEvent {
    pub fn new(elapsed: f64, kind: EventKind) -> Self {
        Self { elapsed, kind }
    }
}
