//! # gpusum-gpu
//!
//! Device resolution, resource lifecycle, kernel build, and the
//! upload → dispatch → readback pipeline for the gpusum harness.
//!
//! Provides a [`ComputeBackend`] trait with two implementations:
//! - [`EmulatedBackend`]: host emulation on `rayon` (always available)
//! - `OpenClBackend`: real devices via `opencl3` (feature `opencl`)
//!
//! Everything above the trait is back-end agnostic, so the harness runs
//! the same code path with or without hardware.

pub mod backend;
pub mod buffers;
pub mod context;
pub mod device;
pub mod emulated;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod pipeline;
pub mod program;
pub mod status;

pub use backend::{BuildReport, ComputeBackend, DeviceDescriptor, KernelArg, PlatformDescriptor};
pub use buffers::{DeviceBuffer, HostBuffer};
pub use context::{CommandQueue, ComputeContext, LiveResources};
pub use device::{ComputeDevice, DeviceResolver, Inventory, SelectionPolicy};
pub use emulated::{EmulatedBackend, EmulatedBackendBuilder, FaultPoint, Journal, JournalEntry, ObjectKind};
#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;
pub use pipeline::{Completion, KernelInput, KernelOutput, KernelPipeline, PipelineStep, ProblemDomain};
pub use program::{load_kernel_source, CompiledKernel, Program};
