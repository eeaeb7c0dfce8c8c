//! # gpusum-reference
//!
//! Host-side counterpart of the device kernel, plus the pieces the harness
//! needs around it.
//!
//! Provides:
//! - The sequential windowed sum of squares with clamp-to-edge boundaries
//! - Element-wise tolerance comparison of two outputs
//! - Reproducible input generation

pub mod compare;
pub mod inputs;
pub mod window;

pub use compare::{compare, Comparison};
pub use inputs::{generate_inputs, InputPair};
pub use window::{clamp_index, windowed_sum, windowed_sum_into};
