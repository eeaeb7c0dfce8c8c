//! Error types for the gpusum harness.
//!
//! All crates return `HarnessResult<T>` from fallible operations.
//! A validation mismatch is not an error; see `gpusum_reference::Comparison`.

use thiserror::Error;

use crate::kinds::BuildStatus;

/// Unified error type for the gpusum harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No GPU-class device among all enumerated platforms.
    #[error("No GPU-class compute device found across {platforms} platform(s)")]
    DeviceNotFound { platforms: usize },

    /// Host or device memory could not be allocated.
    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// Kernel source failed to compile. `log` is the compiler output verbatim.
    #[error("Kernel build failed (status {status}):\n{log}")]
    BuildFailure { status: BuildStatus, log: String },

    /// A transfer, enqueue, or execution step reported a non-success status.
    #[error("Dispatch failed during '{step}': {reason}")]
    DispatchFailure { step: String, reason: String },

    /// Any other compute API call failed.
    #[error("Compute API error in {operation}: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// Source and destination element counts differ.
    #[error("Buffer size mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A buffer was used against its declared access mode.
    #[error("Access mode violation: {0}")]
    AccessViolation(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HarnessError {
    /// Shorthand for an [`HarnessError::Api`] error.
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}

/// Convenience alias for `Result<T, HarnessError>`.
pub type HarnessResult<T> = Result<T, HarnessError>;
