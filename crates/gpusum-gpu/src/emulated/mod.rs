//! Host emulation back-end.
//!
//! Presents a configurable set of platforms and devices, checks kernel
//! source with a small front-end, and runs recognised entry points as
//! native work items on the `rayon` thread pool. The queue is in-order and
//! each command completes before its enqueue call returns.
//!
//! Faults can be injected at transfer, dispatch, and finish points so the
//! fail-fast paths of the pipeline can be exercised without hardware.

mod compiler;
mod kernels;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::debug;

use gpusum_types::{
    AccessMode, BufferId, BuildStatus, ContextId, DeviceClass, DeviceId, HarnessError,
    HarnessResult, KernelId, PlatformId, ProgramId, QueueId,
};

use crate::backend::{BuildReport, ComputeBackend, DeviceDescriptor, KernelArg, PlatformDescriptor};
use crate::status::{self, status_name};

use self::compiler::KernelSignature;
use self::kernels::{native_kernel, NativeKernel};

/// Device memory per emulated device unless overridden.
pub const DEFAULT_DEVICE_MEMORY: u64 = 4 << 30;

/// A point in the command stream where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Write,
    Dispatch,
    Read,
    Finish,
}

impl FaultPoint {
    fn operation(self) -> &'static str {
        match self {
            FaultPoint::Write => "enqueue_write",
            FaultPoint::Dispatch => "enqueue_dispatch",
            FaultPoint::Read => "enqueue_read",
            FaultPoint::Finish => "finish",
        }
    }
}

/// Kind of object recorded in the [`Journal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Context,
    Queue,
    Buffer,
    Program,
    Kernel,
}

/// One lifecycle event on the emulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    Created(ObjectKind, u64),
    Released(ObjectKind, u64),
}

/// Shared record of object creation and release, readable after the
/// back-end has been moved into a context.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    fn record(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }

    /// Snapshot of every entry in order.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Kinds released, in release order.
    pub fn release_order(&self) -> Vec<ObjectKind> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Released(kind, _) => Some(*kind),
                JournalEntry::Created(..) => None,
            })
            .collect()
    }

    /// Number of objects created but not yet released.
    pub fn live(&self) -> usize {
        let entries = self.entries.lock();
        let created = entries
            .iter()
            .filter(|e| matches!(e, JournalEntry::Created(..)))
            .count();
        created - (entries.len() - created)
    }
}

#[derive(Debug, Clone)]
struct DeviceSpec {
    descriptor: DeviceDescriptor,
}

#[derive(Debug, Clone)]
struct PlatformSpec {
    vendor: String,
    name: String,
    version: String,
    devices: Vec<DeviceSpec>,
}

/// Builder for [`EmulatedBackend`].
///
/// ```text
/// EmulatedBackend::builder()
///     .platform("Vendor A", "Platform A", "OpenCL 1.2")
///     .device("Vendor A", "CPU", "OpenCL 1.2", DeviceClass::Cpu)
///     .device("Vendor A", "GPU", "OpenCL 1.2", DeviceClass::Gpu)
///     .build()
/// ```
#[derive(Debug, Default)]
pub struct EmulatedBackendBuilder {
    platforms: Vec<PlatformSpec>,
    device_memory: Option<u64>,
    faults: Vec<FaultPoint>,
    build_status: Option<BuildStatus>,
    next_device: u64,
}

impl EmulatedBackendBuilder {
    /// Starts a new platform. Subsequent devices attach to it.
    pub fn platform(mut self, vendor: &str, name: &str, version: &str) -> Self {
        self.platforms.push(PlatformSpec {
            vendor: vendor.into(),
            name: name.into(),
            version: version.into(),
            devices: Vec::new(),
        });
        self
    }

    /// Adds a device to the most recent platform.
    pub fn device(mut self, vendor: &str, name: &str, version: &str, class: DeviceClass) -> Self {
        if self.platforms.is_empty() {
            self = self.platform("gpusum", "Host Emulation", "OpenCL 1.2 emulated");
        }
        self.next_device += 1;
        let descriptor = DeviceDescriptor {
            id: DeviceId(self.next_device),
            vendor: vendor.into(),
            name: name.into(),
            version: version.into(),
            class,
        };
        if let Some(platform) = self.platforms.last_mut() {
            platform.devices.push(DeviceSpec { descriptor });
        }
        self
    }

    /// Device memory available to each context, in bytes.
    pub fn device_memory(mut self, bytes: u64) -> Self {
        self.device_memory = Some(bytes);
        self
    }

    /// Make every call at `point` fail with `CL_OUT_OF_RESOURCES`.
    pub fn fail_at(mut self, point: FaultPoint) -> Self {
        self.faults.push(point);
        self
    }

    /// Report `status` for every program build, whatever the compiler
    /// front-end decides. The log is still the front-end's.
    pub fn build_status(mut self, status: BuildStatus) -> Self {
        self.build_status = Some(status);
        self
    }

    pub fn build(self) -> EmulatedBackend {
        EmulatedBackend {
            platforms: self.platforms,
            device_memory: self.device_memory.unwrap_or(DEFAULT_DEVICE_MEMORY),
            faults: self.faults,
            build_status: self.build_status,
            journal: Journal::default(),
            next_handle: 0,
            contexts: HashMap::new(),
            queues: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
        }
    }
}

struct ContextState {
    allocated: u64,
}

struct QueueState {
    context: ContextId,
}

struct BufferState {
    context: ContextId,
    access: AccessMode,
    data: Vec<f32>,
}

struct ProgramState {
    kernels: Vec<KernelSignature>,
    built: bool,
}

struct KernelState {
    native: &'static NativeKernel,
    args: Vec<Option<KernelArg>>,
}

/// Host emulation of a compute platform.
pub struct EmulatedBackend {
    platforms: Vec<PlatformSpec>,
    device_memory: u64,
    faults: Vec<FaultPoint>,
    build_status: Option<BuildStatus>,
    journal: Journal,
    next_handle: u64,
    contexts: HashMap<ContextId, ContextState>,
    queues: HashMap<QueueId, QueueState>,
    buffers: HashMap<BufferId, BufferState>,
    programs: HashMap<ProgramId, ProgramState>,
    kernels: HashMap<KernelId, KernelState>,
}

impl EmulatedBackend {
    /// One platform with one GPU-class device.
    pub fn new() -> Self {
        Self::builder()
            .platform("gpusum", "Host Emulation", "OpenCL 1.2 emulated")
            .device("gpusum", "Emulated GPU", "OpenCL 1.2 emulated", DeviceClass::Gpu)
            .build()
    }

    pub fn builder() -> EmulatedBackendBuilder {
        EmulatedBackendBuilder::default()
    }

    /// Handle to the lifecycle journal. Stays valid after the back-end moves.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn fault(&self, point: FaultPoint) -> HarnessResult<()> {
        if self.faults.contains(&point) {
            return Err(api_error(
                point.operation(),
                status::CL_OUT_OF_RESOURCES,
                "injected fault",
            ));
        }
        Ok(())
    }

    fn has_device(&self, platform: PlatformId, device: DeviceId) -> bool {
        self.platforms
            .get(platform.raw() as usize)
            .is_some_and(|p| p.devices.iter().any(|d| d.descriptor.id == device))
    }

    /// Device data bound to an input slot of a dispatch.
    fn input_slice(
        &self,
        arg: KernelArg,
        slot: u32,
        global_size: usize,
        operation: &'static str,
    ) -> HarnessResult<&[f32]> {
        let id = match arg {
            KernelArg::Buffer(id) => id,
            _ => {
                return Err(api_error(
                    operation,
                    status::CL_INVALID_ARG_VALUE,
                    format!("input slot {slot} is not a buffer"),
                ))
            }
        };
        let state = self.buffer(id, operation)?;
        if state.access == AccessMode::WriteOnly {
            return Err(api_error(
                operation,
                status::CL_INVALID_ARG_VALUE,
                format!("input slot {slot} is bound to write-only buffer {id}"),
            ));
        }
        if state.data.len() < global_size {
            return Err(api_error(operation, status::CL_INVALID_GLOBAL_WORK_SIZE, global_size));
        }
        Ok(state.data.as_slice())
    }

    fn check_queue(&self, queue: QueueId, operation: &'static str) -> HarnessResult<ContextId> {
        self.queues
            .get(&queue)
            .map(|q| q.context)
            .ok_or_else(|| api_error(operation, status::CL_INVALID_COMMAND_QUEUE, queue))
    }

    fn buffer(&self, buffer: BufferId, operation: &'static str) -> HarnessResult<&BufferState> {
        self.buffers
            .get(&buffer)
            .ok_or_else(|| api_error(operation, status::CL_INVALID_MEM_OBJECT, buffer))
    }
}

impl Default for EmulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error(operation: &'static str, code: i32, detail: impl std::fmt::Display) -> HarnessError {
    HarnessError::api(operation, format!("{} ({detail})", status_name(code)))
}

impl ComputeBackend for EmulatedBackend {
    fn name(&self) -> &str {
        "emulated"
    }

    fn is_hardware(&self) -> bool {
        false
    }

    fn platforms(&mut self) -> HarnessResult<Vec<PlatformDescriptor>> {
        Ok(self
            .platforms
            .iter()
            .enumerate()
            .map(|(i, p)| PlatformDescriptor {
                id: PlatformId(i as u64),
                vendor: p.vendor.clone(),
                name: p.name.clone(),
                version: p.version.clone(),
                devices: p.devices.iter().map(|d| d.descriptor.clone()).collect(),
            })
            .collect())
    }

    fn create_context(&mut self, platform: PlatformId, device: DeviceId) -> HarnessResult<ContextId> {
        if !self.has_device(platform, device) {
            return Err(api_error("create_context", status::CL_INVALID_DEVICE, device));
        }
        let id = ContextId(self.next());
        self.contexts.insert(id, ContextState { allocated: 0 });
        self.journal.record(JournalEntry::Created(ObjectKind::Context, id.raw()));
        Ok(id)
    }

    fn release_context(&mut self, context: ContextId) -> HarnessResult<()> {
        self.contexts
            .remove(&context)
            .ok_or_else(|| api_error("release_context", status::CL_INVALID_CONTEXT, context))?;
        self.journal.record(JournalEntry::Released(ObjectKind::Context, context.raw()));
        Ok(())
    }

    fn create_queue(&mut self, context: ContextId) -> HarnessResult<QueueId> {
        if !self.contexts.contains_key(&context) {
            return Err(api_error("create_queue", status::CL_INVALID_CONTEXT, context));
        }
        let id = QueueId(self.next());
        self.queues.insert(id, QueueState { context });
        self.journal.record(JournalEntry::Created(ObjectKind::Queue, id.raw()));
        Ok(id)
    }

    fn release_queue(&mut self, queue: QueueId) -> HarnessResult<()> {
        self.queues
            .remove(&queue)
            .ok_or_else(|| api_error("release_queue", status::CL_INVALID_COMMAND_QUEUE, queue))?;
        self.journal.record(JournalEntry::Released(ObjectKind::Queue, queue.raw()));
        Ok(())
    }

    fn create_buffer(
        &mut self,
        context: ContextId,
        access: AccessMode,
        byte_size: usize,
    ) -> HarnessResult<BufferId> {
        let limit = self.device_memory;
        let state = self
            .contexts
            .get_mut(&context)
            .ok_or_else(|| api_error("create_buffer", status::CL_INVALID_CONTEXT, context))?;
        if byte_size == 0 {
            return Err(api_error("create_buffer", status::CL_INVALID_BUFFER_SIZE, "0 bytes"));
        }
        let requested = byte_size as u64;
        if state.allocated.saturating_add(requested) > limit {
            return Err(HarnessError::AllocationFailure(format!(
                "{}: requested {requested} bytes with {} of {limit} bytes in use",
                status_name(status::CL_MEM_OBJECT_ALLOCATION_FAILURE),
                state.allocated
            )));
        }

        let count = byte_size / std::mem::size_of::<f32>();
        let mut data = Vec::new();
        data.try_reserve_exact(count).map_err(|e| {
            HarnessError::AllocationFailure(format!(
                "{}: {e}",
                status_name(status::CL_MEM_OBJECT_ALLOCATION_FAILURE)
            ))
        })?;
        data.resize(count, 0.0);
        state.allocated += requested;

        let id = BufferId(self.next());
        self.buffers.insert(
            id,
            BufferState {
                context,
                access,
                data,
            },
        );
        self.journal.record(JournalEntry::Created(ObjectKind::Buffer, id.raw()));
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> HarnessResult<()> {
        let state = self
            .buffers
            .remove(&buffer)
            .ok_or_else(|| api_error("release_buffer", status::CL_INVALID_MEM_OBJECT, buffer))?;
        let bytes = std::mem::size_of_val(state.data.as_slice()) as u64;
        if let Some(ctx) = self.contexts.get_mut(&state.context) {
            ctx.allocated = ctx.allocated.saturating_sub(bytes);
        }
        self.journal.record(JournalEntry::Released(ObjectKind::Buffer, buffer.raw()));
        Ok(())
    }

    fn build_program(
        &mut self,
        context: ContextId,
        source: &str,
        options: &str,
    ) -> HarnessResult<(ProgramId, BuildReport)> {
        if !self.contexts.contains_key(&context) {
            return Err(api_error("build_program", status::CL_INVALID_CONTEXT, context));
        }
        let mut output = compiler::compile(source, options);
        if let Some(status) = self.build_status {
            output.status = status;
        }
        debug!(status = %output.status, kernels = output.kernels.len(), "Emulated build finished");

        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            ProgramState {
                kernels: output.kernels,
                built: output.status == BuildStatus::Success,
            },
        );
        self.journal.record(JournalEntry::Created(ObjectKind::Program, id.raw()));
        Ok((
            id,
            BuildReport {
                status: output.status,
                log: output.log,
            },
        ))
    }

    fn release_program(&mut self, program: ProgramId) -> HarnessResult<()> {
        self.programs
            .remove(&program)
            .ok_or_else(|| api_error("release_program", status::CL_INVALID_PROGRAM, program))?;
        self.journal.record(JournalEntry::Released(ObjectKind::Program, program.raw()));
        Ok(())
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> HarnessResult<KernelId> {
        let state = self
            .programs
            .get(&program)
            .ok_or_else(|| api_error("create_kernel", status::CL_INVALID_PROGRAM, program))?;
        if !state.built {
            return Err(api_error(
                "create_kernel",
                status::CL_INVALID_PROGRAM_EXECUTABLE,
                program,
            ));
        }
        if !state.kernels.iter().any(|k| k.name == name) {
            return Err(api_error("create_kernel", status::CL_INVALID_KERNEL_NAME, name));
        }
        // The front-end only accepts entry points with a native implementation.
        let native = native_kernel(name)
            .ok_or_else(|| api_error("create_kernel", status::CL_INVALID_KERNEL_NAME, name))?;

        let id = KernelId(self.next());
        self.kernels.insert(
            id,
            KernelState {
                native,
                args: vec![None; native.params as usize],
            },
        );
        self.journal.record(JournalEntry::Created(ObjectKind::Kernel, id.raw()));
        Ok(id)
    }

    fn kernel_arg_count(&mut self, kernel: KernelId) -> HarnessResult<u32> {
        self.kernels
            .get(&kernel)
            .map(|k| k.native.params)
            .ok_or_else(|| api_error("kernel_arg_count", status::CL_INVALID_KERNEL, kernel))
    }

    fn release_kernel(&mut self, kernel: KernelId) -> HarnessResult<()> {
        self.kernels
            .remove(&kernel)
            .ok_or_else(|| api_error("release_kernel", status::CL_INVALID_KERNEL, kernel))?;
        self.journal.record(JournalEntry::Released(ObjectKind::Kernel, kernel.raw()));
        Ok(())
    }

    fn set_kernel_arg(&mut self, kernel: KernelId, index: u32, arg: KernelArg) -> HarnessResult<()> {
        if let KernelArg::Buffer(buffer) = arg {
            self.buffer(buffer, "set_kernel_arg")?;
        }
        let state = self
            .kernels
            .get_mut(&kernel)
            .ok_or_else(|| api_error("set_kernel_arg", status::CL_INVALID_KERNEL, kernel))?;
        let slot = state
            .args
            .get_mut(index as usize)
            .ok_or_else(|| api_error("set_kernel_arg", status::CL_INVALID_ARG_INDEX, index))?;
        *slot = Some(arg);
        Ok(())
    }

    unsafe fn enqueue_write(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        data: &[f32],
    ) -> HarnessResult<()> {
        self.fault(FaultPoint::Write)?;
        self.check_queue(queue, "enqueue_write")?;
        let state = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| api_error("enqueue_write", status::CL_INVALID_MEM_OBJECT, buffer))?;
        if data.len() > state.data.len() {
            return Err(api_error(
                "enqueue_write",
                status::CL_INVALID_VALUE,
                format!("{} elements into a {}-element buffer", data.len(), state.data.len()),
            ));
        }
        state.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn enqueue_dispatch(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
    ) -> HarnessResult<()> {
        const OP: &str = "enqueue_dispatch";
        self.fault(FaultPoint::Dispatch)?;
        self.check_queue(queue, OP)?;
        if global_size == 0 {
            return Err(api_error(OP, status::CL_INVALID_GLOBAL_WORK_SIZE, 0));
        }
        let state = self
            .kernels
            .get(&kernel)
            .ok_or_else(|| api_error(OP, status::CL_INVALID_KERNEL, kernel))?;
        let native = state.native;
        let args = state
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| a.ok_or_else(|| api_error(OP, status::CL_INVALID_KERNEL_ARGS, format!("slot {i} unset"))))
            .collect::<HarnessResult<Vec<KernelArg>>>()?;

        let output_id = match args[native.output as usize] {
            KernelArg::Buffer(id) => id,
            _ => return Err(api_error(OP, status::CL_INVALID_ARG_VALUE, "output slot is not a buffer")),
        };
        for &input in native.inputs {
            if args[input as usize] == KernelArg::Buffer(output_id) {
                return Err(api_error(OP, status::CL_INVALID_ARG_VALUE, "output aliases an input"));
            }
        }

        let mut output = {
            let out = self
                .buffers
                .get_mut(&output_id)
                .ok_or_else(|| api_error(OP, status::CL_INVALID_MEM_OBJECT, output_id))?;
            if out.access == AccessMode::ReadOnly {
                return Err(api_error(OP, status::CL_INVALID_ARG_VALUE, "output buffer is read-only"));
            }
            if out.data.len() < global_size {
                return Err(api_error(OP, status::CL_INVALID_GLOBAL_WORK_SIZE, global_size));
            }
            std::mem::take(&mut out.data)
        };

        let inputs = native
            .inputs
            .iter()
            .map(|&slot| self.input_slice(args[slot as usize], slot, global_size, OP))
            .collect::<HarnessResult<Vec<&[f32]>>>();

        let result = inputs.map(|inputs| {
            output[..global_size]
                .par_iter_mut()
                .enumerate()
                .for_each(|(gid, o)| *o = (native.work_item)(gid, global_size, &inputs));
            debug!(kernel = native.name, global_size, "Emulated dispatch complete");
        });

        // Put the output back even when argument resolution failed.
        if let Some(out) = self.buffers.get_mut(&output_id) {
            out.data = output;
        }
        result
    }

    unsafe fn enqueue_read(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        out: &mut [f32],
    ) -> HarnessResult<()> {
        self.fault(FaultPoint::Read)?;
        self.check_queue(queue, "enqueue_read")?;
        let state = self.buffer(buffer, "enqueue_read")?;
        if out.len() > state.data.len() {
            return Err(api_error(
                "enqueue_read",
                status::CL_INVALID_VALUE,
                format!("{} elements from a {}-element buffer", out.len(), state.data.len()),
            ));
        }
        out.copy_from_slice(&state.data[..out.len()]);
        Ok(())
    }

    fn finish(&mut self, queue: QueueId) -> HarnessResult<()> {
        self.fault(FaultPoint::Finish)?;
        self.check_queue(queue, "finish")?;
        Ok(())
    }
}
