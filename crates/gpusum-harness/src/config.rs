//! Harness configuration.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! changes. Command-line flags are applied on top by the CLI.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use gpusum_gpu::{ComputeBackend, EmulatedBackend, SelectionPolicy};
use gpusum_types::constants::{
    DEFAULT_BUILD_OPTIONS, DEFAULT_EPSILON, DEFAULT_INPUT_MAX, DEFAULT_KERNEL_PATH,
    DEFAULT_PROBLEM_SIZE, DEFAULT_SEED, KERNEL_ENTRY_POINT,
};
use gpusum_types::{HarnessError, HarnessResult};

/// Which compute back-end a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Host emulation. Always available.
    #[default]
    Emulated,
    /// Real OpenCL devices. Requires the `opencl` feature.
    Opencl,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Emulated => "emulated",
            BackendKind::Opencl => "opencl",
        }
    }

    /// Instantiates the back-end.
    pub fn create(self) -> HarnessResult<Box<dyn ComputeBackend>> {
        match self {
            BackendKind::Emulated => Ok(Box::new(EmulatedBackend::new())),
            #[cfg(feature = "opencl")]
            BackendKind::Opencl => Ok(Box::new(gpusum_gpu::OpenClBackend::new())),
            #[cfg(not(feature = "opencl"))]
            BackendKind::Opencl => Err(HarnessError::InvalidConfig(
                "the opencl back-end requires building with the `opencl` feature".into(),
            )),
        }
    }
}

impl FromStr for BackendKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emulated" => Ok(BackendKind::Emulated),
            "opencl" => Ok(BackendKind::Opencl),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown backend '{other}' (expected emulated or opencl)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for one harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Number of elements in each input and in the output.
    pub problem_size: usize,

    /// Absolute tolerance for device/host comparison.
    pub epsilon: f32,

    /// Kernel source file.
    pub kernel_path: PathBuf,

    /// Kernel entry point name.
    pub entry_point: String,

    /// Passed verbatim to the program build.
    pub build_options: String,

    /// Seed for input generation.
    pub seed: u64,

    /// Inputs are uniform in `[0, input_max)`.
    pub input_max: f32,

    pub selection: SelectionPolicy,

    pub backend: BackendKind,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            problem_size: DEFAULT_PROBLEM_SIZE,
            epsilon: DEFAULT_EPSILON,
            kernel_path: PathBuf::from(DEFAULT_KERNEL_PATH),
            entry_point: KERNEL_ENTRY_POINT.to_string(),
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            seed: DEFAULT_SEED,
            input_max: DEFAULT_INPUT_MAX,
            selection: SelectionPolicy::default(),
            backend: BackendKind::default(),
        }
    }
}

impl HarnessConfig {
    /// Creates a small config for quick checks: 64 Ki elements.
    pub fn quick() -> Self {
        Self {
            problem_size: 64 * 1024,
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        toml::from_str(content).map_err(|e| HarnessError::Serialization(e.to_string()))
    }

    /// Loads a config file. Missing fields take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Io(std::io::Error::new(
                e.kind(),
                format!("config {}: {e}", path.display()),
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> HarnessResult<String> {
        toml::to_string(self).map_err(|e| HarnessError::Serialization(e.to_string()))
    }

    /// Checks values that would make a run meaningless.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.problem_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "problem_size must be at least 1".into(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(HarnessError::InvalidConfig(format!(
                "epsilon must be positive and finite, got {}",
                self.epsilon
            )));
        }
        if !(self.input_max.is_finite() && self.input_max > 0.0) {
            return Err(HarnessError::InvalidConfig(format!(
                "input_max must be positive and finite, got {}",
                self.input_max
            )));
        }
        if self.entry_point.trim().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "entry_point must not be empty".into(),
            ));
        }
        if self.problem_size.checked_mul(std::mem::size_of::<f32>()).is_none() {
            return Err(HarnessError::InvalidConfig(format!(
                "problem_size {} overflows the device address space",
                self.problem_size
            )));
        }
        Ok(())
    }
}
