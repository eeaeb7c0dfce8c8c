//! Compute back-end trait.
//!
//! The [`ComputeBackend`] trait is the seam between the harness and a
//! device API: platform/device enumeration, contexts, queues, buffers,
//! program builds, and kernel dispatch. Everything above it (resolver,
//! lifecycle, pipeline) is back-end agnostic.
//!
//! # Implementations
//! - [`EmulatedBackend`](crate::emulated::EmulatedBackend): host emulation (always available)
//! - `OpenClBackend`: OpenCL via `opencl3` (feature `opencl`)

use serde::{Deserialize, Serialize};

use gpusum_types::{
    AccessMode, BufferId, BuildStatus, ContextId, DeviceClass, DeviceId, HarnessResult, KernelId,
    PlatformId, ProgramId, QueueId,
};

/// One device as reported by its platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub class: DeviceClass,
}

/// One platform and the devices it exposes, in enumeration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub id: PlatformId,
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub devices: Vec<DeviceDescriptor>,
}

/// Status and compiler output of one program build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: BuildStatus,
    /// Full build log. May contain warnings on success.
    pub log: String,
}

impl BuildReport {
    pub fn success() -> Self {
        Self {
            status: BuildStatus::Success,
            log: String::new(),
        }
    }
}

/// A value bound to a kernel argument slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    /// Pointer-type argument: a device buffer.
    Buffer(BufferId),
    Uint(u32),
    Float(f32),
}

/// Trait for compute device back-ends.
///
/// Handles returned by one back-end are meaningless to another.
/// Release calls on unknown handles return an error; idempotence is
/// provided one level up by [`ComputeContext`](crate::context::ComputeContext).
pub trait ComputeBackend: Send {
    /// Returns the back-end name (e.g., "emulated", "opencl").
    fn name(&self) -> &str;

    /// Returns true if work runs on real accelerator hardware.
    fn is_hardware(&self) -> bool;

    /// Enumerate all platforms and, for each, all devices.
    fn platforms(&mut self) -> HarnessResult<Vec<PlatformDescriptor>>;

    /// Create an execution context grouping exactly one device.
    fn create_context(&mut self, platform: PlatformId, device: DeviceId) -> HarnessResult<ContextId>;

    fn release_context(&mut self, context: ContextId) -> HarnessResult<()>;

    /// Create an in-order command queue on the context's device.
    fn create_queue(&mut self, context: ContextId) -> HarnessResult<QueueId>;

    fn release_queue(&mut self, queue: QueueId) -> HarnessResult<()>;

    /// Allocate `byte_size` bytes of device memory.
    fn create_buffer(
        &mut self,
        context: ContextId,
        access: AccessMode,
        byte_size: usize,
    ) -> HarnessResult<BufferId>;

    fn release_buffer(&mut self, buffer: BufferId) -> HarnessResult<()>;

    /// Create a program from source and build it for the context's device.
    ///
    /// A program object exists even when the build fails, so the handle is
    /// returned alongside the report and must be released by the caller.
    fn build_program(
        &mut self,
        context: ContextId,
        source: &str,
        options: &str,
    ) -> HarnessResult<(ProgramId, BuildReport)>;

    fn release_program(&mut self, program: ProgramId) -> HarnessResult<()>;

    /// Create a kernel for the named entry point of a built program.
    fn create_kernel(&mut self, program: ProgramId, name: &str) -> HarnessResult<KernelId>;

    /// Number of positional argument slots the kernel declares.
    fn kernel_arg_count(&mut self, kernel: KernelId) -> HarnessResult<u32>;

    fn release_kernel(&mut self, kernel: KernelId) -> HarnessResult<()>;

    /// Bind a value to argument slot `index`.
    fn set_kernel_arg(&mut self, kernel: KernelId, index: u32, arg: KernelArg) -> HarnessResult<()>;

    /// Issue a non-blocking host-to-device transfer.
    ///
    /// # Safety
    /// `data` must stay alive and unmodified until the next successful or
    /// failed [`finish`](Self::finish) on `queue` returns.
    unsafe fn enqueue_write(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        data: &[f32],
    ) -> HarnessResult<()>;

    /// Dispatch `kernel` over a 1-D domain of `global_size` work items,
    /// leaving the work-group size to the implementation.
    fn enqueue_dispatch(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
    ) -> HarnessResult<()>;

    /// Issue a non-blocking device-to-host transfer.
    ///
    /// # Safety
    /// `out` must stay alive and must not be accessed until the next
    /// [`finish`](Self::finish) on `queue` returns.
    unsafe fn enqueue_read(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        out: &mut [f32],
    ) -> HarnessResult<()>;

    /// Block until every command submitted to `queue` has completed.
    fn finish(&mut self, queue: QueueId) -> HarnessResult<()>;
}
