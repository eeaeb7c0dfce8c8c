//! # gpusum-harness
//!
//! End-to-end windowed-sum harness: select a device, build the kernel,
//! run it over generated inputs, compute the host reference, and compare.
//!
//! Provides the TOML-loadable [`HarnessConfig`], the [`HarnessRunner`],
//! and [`RunMetrics`] with CSV/JSON export.

pub mod config;
pub mod metrics;
pub mod runner;

pub use config::{BackendKind, HarnessConfig};
pub use metrics::RunMetrics;
pub use runner::{DeviceSurvey, HarnessRunner, RunReport};
