//! Small shared enums: device class, buffer access mode, build status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of a compute device as reported by its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Cpu,
    Gpu,
    Accelerator,
    Other,
}

impl DeviceClass {
    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceClass::Cpu => "CPU",
            DeviceClass::Gpu => "GPU",
            DeviceClass::Accelerator => "accelerator",
            DeviceClass::Other => "other",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How kernels may touch a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Kernel reads, host writes.
    ReadOnly,
    /// Kernel writes, host reads back.
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// True if the host may upload into a buffer with this mode.
    pub fn accepts_upload(self) -> bool {
        !matches!(self, AccessMode::WriteOnly)
    }

    /// True if the kernel may write, so the host may read the result back.
    pub fn accepts_readback(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMode::ReadOnly => "read-only",
            AccessMode::WriteOnly => "write-only",
            AccessMode::ReadWrite => "read-write",
        })
    }
}

/// Outcome reported by the program build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Error,
    /// No build was performed.
    None,
    /// Build has not completed. Fatal for a synchronous harness.
    InProgress,
}

impl BuildStatus {
    #[inline]
    pub fn is_success(self) -> bool {
        self == BuildStatus::Success
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStatus::Success => "success",
            BuildStatus::Error => "error",
            BuildStatus::None => "none",
            BuildStatus::InProgress => "in progress",
        })
    }
}
