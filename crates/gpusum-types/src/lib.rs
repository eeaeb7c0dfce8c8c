//! # gpusum-types
//!
//! Shared error taxonomy, typed handles, and constants for the gpusum
//! windowed-sum harness.
//!
//! This crate has no compute logic. It defines the vocabulary
//! that all other gpusum crates share.

pub mod constants;
pub mod error;
pub mod ids;
pub mod kinds;

pub use error::{HarnessError, HarnessResult};
pub use ids::{BufferId, ContextId, DeviceId, KernelId, PlatformId, ProgramId, QueueId};
pub use kinds::{AccessMode, BuildStatus, DeviceClass};
