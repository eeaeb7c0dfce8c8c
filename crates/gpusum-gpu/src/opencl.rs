//! OpenCL back-end via `opencl3`.
//!
//! Objects are owned by `opencl3` wrappers that release their handle on
//! drop, so each `release_*` call removes the wrapper from its table.

use std::collections::HashMap;
use std::ptr;

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
};
use opencl3::error_codes::ClError;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::platform::{get_platforms, Platform};
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_float, cl_uint, CL_NON_BLOCKING};
use tracing::debug;

use gpusum_types::{
    AccessMode, BufferId, BuildStatus, ContextId, DeviceClass, DeviceId, HarnessError,
    HarnessResult, KernelId, PlatformId, ProgramId, QueueId,
};

use crate::backend::{BuildReport, ComputeBackend, DeviceDescriptor, KernelArg, PlatformDescriptor};
use crate::status::status_name;

const CL_BUILD_SUCCESS: i32 = 0;
const CL_BUILD_NONE: i32 = -1;
const CL_BUILD_ERROR: i32 = -2;

fn cl_error(operation: &'static str, e: ClError) -> HarnessError {
    HarnessError::api(operation, format!("{} ({})", status_name(e.0), e.0))
}

struct ContextEntry {
    context: Context,
    device: cl_device_id,
}

struct ProgramEntry {
    program: Program,
}

/// Real-device back-end.
pub struct OpenClBackend {
    platforms: Vec<Platform>,
    devices: HashMap<DeviceId, cl_device_id>,
    next_handle: u64,
    contexts: HashMap<ContextId, ContextEntry>,
    queues: HashMap<QueueId, CommandQueue>,
    buffers: HashMap<BufferId, Buffer<cl_float>>,
    programs: HashMap<ProgramId, ProgramEntry>,
    kernels: HashMap<KernelId, Kernel>,
}

// SAFETY: the wrapped OpenCL handles are reference-counted by the ICD and
// may be used from any thread. The back-end is only ever accessed through
// `&mut self`, so no handle is used concurrently from two threads.
unsafe impl Send for OpenClBackend {}

impl OpenClBackend {
    pub fn new() -> Self {
        Self {
            platforms: Vec::new(),
            devices: HashMap::new(),
            next_handle: 0,
            contexts: HashMap::new(),
            queues: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
        }
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn queue(&self, queue: QueueId, operation: &'static str) -> HarnessResult<&CommandQueue> {
        self.queues
            .get(&queue)
            .ok_or_else(|| HarnessError::api(operation, format!("unknown {queue}")))
    }
}

impl Default for OpenClBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn device_class(device_type: u64) -> DeviceClass {
    if device_type & CL_DEVICE_TYPE_GPU != 0 {
        DeviceClass::Gpu
    } else if device_type & CL_DEVICE_TYPE_CPU != 0 {
        DeviceClass::Cpu
    } else if device_type & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceClass::Accelerator
    } else {
        DeviceClass::Other
    }
}

impl ComputeBackend for OpenClBackend {
    fn name(&self) -> &str {
        "opencl"
    }

    fn is_hardware(&self) -> bool {
        true
    }

    fn platforms(&mut self) -> HarnessResult<Vec<PlatformDescriptor>> {
        self.platforms = get_platforms().map_err(|e| cl_error("get_platforms", e))?;
        self.devices.clear();

        let mut out = Vec::with_capacity(self.platforms.len());
        let mut next_device = 0u64;
        for (index, platform) in self.platforms.iter().enumerate() {
            let ids = platform
                .get_devices(CL_DEVICE_TYPE_ALL)
                .map_err(|e| cl_error("get_devices", e))?;
            let mut devices = Vec::with_capacity(ids.len());
            for raw in ids {
                let device = Device::new(raw);
                next_device += 1;
                let id = DeviceId(next_device);
                self.devices.insert(id, raw);
                devices.push(DeviceDescriptor {
                    id,
                    vendor: device.vendor().map_err(|e| cl_error("device_vendor", e))?,
                    name: device.name().map_err(|e| cl_error("device_name", e))?,
                    version: device.version().map_err(|e| cl_error("device_version", e))?,
                    class: device_class(device.dev_type().map_err(|e| cl_error("device_type", e))?),
                });
            }
            out.push(PlatformDescriptor {
                id: PlatformId(index as u64),
                vendor: platform.vendor().map_err(|e| cl_error("platform_vendor", e))?,
                name: platform.name().map_err(|e| cl_error("platform_name", e))?,
                version: platform.version().map_err(|e| cl_error("platform_version", e))?,
                devices,
            });
        }
        Ok(out)
    }

    fn create_context(&mut self, _platform: PlatformId, device: DeviceId) -> HarnessResult<ContextId> {
        let raw = *self
            .devices
            .get(&device)
            .ok_or_else(|| HarnessError::api("create_context", format!("unknown {device}")))?;
        let context =
            Context::from_device(&Device::new(raw)).map_err(|e| cl_error("create_context", e))?;
        let id = ContextId(self.next());
        self.contexts.insert(id, ContextEntry { context, device: raw });
        Ok(id)
    }

    fn release_context(&mut self, context: ContextId) -> HarnessResult<()> {
        self.contexts
            .remove(&context)
            .map(drop)
            .ok_or_else(|| HarnessError::api("release_context", format!("unknown {context}")))
    }

    fn create_queue(&mut self, context: ContextId) -> HarnessResult<QueueId> {
        let entry = self
            .contexts
            .get(&context)
            .ok_or_else(|| HarnessError::api("create_queue", format!("unknown {context}")))?;
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&entry.context, 0)
            .map_err(|e| cl_error("create_queue", e))?;
        let id = QueueId(self.next());
        self.queues.insert(id, queue);
        Ok(id)
    }

    fn release_queue(&mut self, queue: QueueId) -> HarnessResult<()> {
        self.queues
            .remove(&queue)
            .map(drop)
            .ok_or_else(|| HarnessError::api("release_queue", format!("unknown {queue}")))
    }

    fn create_buffer(
        &mut self,
        context: ContextId,
        access: AccessMode,
        byte_size: usize,
    ) -> HarnessResult<BufferId> {
        let entry = self
            .contexts
            .get(&context)
            .ok_or_else(|| HarnessError::api("create_buffer", format!("unknown {context}")))?;
        let flags = match access {
            AccessMode::ReadOnly => CL_MEM_READ_ONLY,
            AccessMode::WriteOnly => CL_MEM_WRITE_ONLY,
            AccessMode::ReadWrite => CL_MEM_READ_WRITE,
        };
        let count = byte_size / std::mem::size_of::<cl_float>();
        // SAFETY: no host pointer is supplied, so the driver owns the storage.
        let buffer = unsafe { Buffer::<cl_float>::create(&entry.context, flags, count, ptr::null_mut()) }
            .map_err(|e| HarnessError::AllocationFailure(format!("{} ({})", status_name(e.0), e.0)))?;
        let id = BufferId(self.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> HarnessResult<()> {
        self.buffers
            .remove(&buffer)
            .map(drop)
            .ok_or_else(|| HarnessError::api("release_buffer", format!("unknown {buffer}")))
    }

    fn build_program(
        &mut self,
        context: ContextId,
        source: &str,
        options: &str,
    ) -> HarnessResult<(ProgramId, BuildReport)> {
        let entry = self
            .contexts
            .get(&context)
            .ok_or_else(|| HarnessError::api("build_program", format!("unknown {context}")))?;
        let mut program = Program::create_from_source(&entry.context, source)
            .map_err(|e| cl_error("create_program", e))?;

        // A failed build still leaves a status and log on the program.
        if let Err(e) = program.build(&[entry.device], options) {
            debug!(error = %status_name(e.0), "clBuildProgram returned an error");
        }
        let status = match program
            .get_build_status(entry.device)
            .map_err(|e| cl_error("get_build_status", e))?
        {
            CL_BUILD_SUCCESS => BuildStatus::Success,
            CL_BUILD_NONE => BuildStatus::None,
            CL_BUILD_ERROR => BuildStatus::Error,
            _ => BuildStatus::InProgress,
        };
        let log = program
            .get_build_log(entry.device)
            .map_err(|e| cl_error("get_build_log", e))?;

        let id = ProgramId(self.next());
        self.programs.insert(id, ProgramEntry { program });
        Ok((id, BuildReport { status, log }))
    }

    fn release_program(&mut self, program: ProgramId) -> HarnessResult<()> {
        self.programs
            .remove(&program)
            .map(drop)
            .ok_or_else(|| HarnessError::api("release_program", format!("unknown {program}")))
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> HarnessResult<KernelId> {
        let entry = self
            .programs
            .get(&program)
            .ok_or_else(|| HarnessError::api("create_kernel", format!("unknown {program}")))?;
        let kernel = Kernel::create(&entry.program, name).map_err(|e| cl_error("create_kernel", e))?;
        let id = KernelId(self.next());
        self.kernels.insert(id, kernel);
        Ok(id)
    }

    fn kernel_arg_count(&mut self, kernel: KernelId) -> HarnessResult<u32> {
        self.kernels
            .get(&kernel)
            .ok_or_else(|| HarnessError::api("kernel_arg_count", format!("unknown {kernel}")))?
            .num_args()
            .map_err(|e| cl_error("kernel_arg_count", e))
    }

    fn release_kernel(&mut self, kernel: KernelId) -> HarnessResult<()> {
        self.kernels
            .remove(&kernel)
            .map(drop)
            .ok_or_else(|| HarnessError::api("release_kernel", format!("unknown {kernel}")))
    }

    fn set_kernel_arg(&mut self, kernel: KernelId, index: u32, arg: KernelArg) -> HarnessResult<()> {
        let k = self
            .kernels
            .get(&kernel)
            .ok_or_else(|| HarnessError::api("set_kernel_arg", format!("unknown {kernel}")))?;
        // SAFETY: each value matches the size of the declared parameter type.
        let result = unsafe {
            match arg {
                KernelArg::Buffer(id) => {
                    let buffer = self
                        .buffers
                        .get(&id)
                        .ok_or_else(|| HarnessError::api("set_kernel_arg", format!("unknown {id}")))?;
                    k.set_arg(index as cl_uint, &buffer.get())
                }
                KernelArg::Uint(v) => k.set_arg(index as cl_uint, &v),
                KernelArg::Float(v) => k.set_arg(index as cl_uint, &v),
            }
        };
        result.map_err(|e| cl_error("set_kernel_arg", e))
    }

    unsafe fn enqueue_write(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        data: &[f32],
    ) -> HarnessResult<()> {
        let q = self
            .queues
            .get(&queue)
            .ok_or_else(|| HarnessError::api("enqueue_write", format!("unknown {queue}")))?;
        let b = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| HarnessError::api("enqueue_write", format!("unknown {buffer}")))?;
        q.enqueue_write_buffer(b, CL_NON_BLOCKING, 0, data, &[])
            .map(drop)
            .map_err(|e| cl_error("enqueue_write", e))
    }

    fn enqueue_dispatch(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
    ) -> HarnessResult<()> {
        let q = self.queue(queue, "enqueue_dispatch")?;
        let k = self
            .kernels
            .get(&kernel)
            .ok_or_else(|| HarnessError::api("enqueue_dispatch", format!("unknown {kernel}")))?;
        let global = [global_size];
        // SAFETY: all arguments were set before dispatch; a null local size
        // leaves the work-group size to the implementation.
        unsafe { q.enqueue_nd_range_kernel(k.get(), 1, ptr::null(), global.as_ptr(), ptr::null(), &[]) }
            .map(drop)
            .map_err(|e| cl_error("enqueue_dispatch", e))
    }

    unsafe fn enqueue_read(
        &mut self,
        queue: QueueId,
        buffer: BufferId,
        out: &mut [f32],
    ) -> HarnessResult<()> {
        let q = self.queue(queue, "enqueue_read")?;
        let b = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| HarnessError::api("enqueue_read", format!("unknown {buffer}")))?;
        q.enqueue_read_buffer(b, CL_NON_BLOCKING, 0, out, &[])
            .map(drop)
            .map_err(|e| cl_error("enqueue_read", e))
    }

    fn finish(&mut self, queue: QueueId) -> HarnessResult<()> {
        self.queue(queue, "finish")?
            .finish()
            .map_err(|e| cl_error("finish", e))
    }
}
