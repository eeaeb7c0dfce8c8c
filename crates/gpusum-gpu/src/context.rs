//! Execution context and resource lifecycle.
//!
//! A [`ComputeContext`] owns the back-end, the selected device, and every
//! object created against it. Objects are released in dependency order:
//!
//! ```text
//! kernels → programs → buffers → queues → context
//! ```
//!
//! `shutdown()` performs that teardown explicitly and reports failures.
//! If the context is dropped without it, `Drop` runs the same sequence.

use tracing::{debug, info, warn};

use gpusum_types::{
    AccessMode, BufferId, ContextId, HarnessError, HarnessResult, KernelId, ProgramId, QueueId,
};

use crate::backend::ComputeBackend;
use crate::buffers::DeviceBuffer;
use crate::device::ComputeDevice;
use crate::program::{CompiledKernel, Program};

/// Ordered submission channel. Released by the context at teardown.
#[derive(Debug)]
pub struct CommandQueue {
    pub(crate) id: QueueId,
    pub(crate) released: bool,
}

impl CommandQueue {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Counts of objects not yet released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    pub queues: usize,
    pub buffers: usize,
    pub programs: usize,
    pub kernels: usize,
}

impl LiveResources {
    pub fn total(&self) -> usize {
        self.queues + self.buffers + self.programs + self.kernels
    }
}

/// One device, one context, and the objects created against it.
pub struct ComputeContext {
    backend: Box<dyn ComputeBackend>,
    device: ComputeDevice,
    context: ContextId,
    queues: Vec<QueueId>,
    buffers: Vec<BufferId>,
    programs: Vec<ProgramId>,
    kernels: Vec<KernelId>,
    torn_down: bool,
}

impl std::fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeContext")
            .field("backend", &self.backend.name())
            .field("device", &self.device.name)
            .field("context", &self.context)
            .field("live", &self.live_resources())
            .finish()
    }
}

impl ComputeContext {
    /// Creates a context for `device` on `backend`.
    pub fn create(mut backend: Box<dyn ComputeBackend>, device: ComputeDevice) -> HarnessResult<Self> {
        info!(device = %device.name, "Creating context");
        let context = backend.create_context(device.platform, device.id)?;
        Ok(Self {
            backend,
            device,
            context,
            queues: Vec::new(),
            buffers: Vec::new(),
            programs: Vec::new(),
            kernels: Vec::new(),
            torn_down: false,
        })
    }

    pub fn device(&self) -> &ComputeDevice {
        &self.device
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn ComputeBackend {
        self.backend.as_mut()
    }

    pub fn live_resources(&self) -> LiveResources {
        LiveResources {
            queues: self.queues.len(),
            buffers: self.buffers.len(),
            programs: self.programs.len(),
            kernels: self.kernels.len(),
        }
    }

    pub fn create_queue(&mut self) -> HarnessResult<CommandQueue> {
        info!("Creating command queue");
        let id = self.backend.create_queue(self.context)?;
        self.queues.push(id);
        Ok(CommandQueue {
            id,
            released: false,
        })
    }

    /// Allocates `byte_size` bytes of device memory with the given access mode.
    pub fn allocate_device(&mut self, access: AccessMode, byte_size: usize) -> HarnessResult<DeviceBuffer> {
        if byte_size == 0 {
            return Err(HarnessError::AllocationFailure(
                "zero-byte device buffer requested".into(),
            ));
        }
        if byte_size % std::mem::size_of::<f32>() != 0 {
            return Err(HarnessError::AllocationFailure(format!(
                "device buffer size {byte_size} is not a whole number of f32 elements"
            )));
        }
        let id = self
            .backend
            .create_buffer(self.context, access, byte_size)
            .map_err(|e| match e {
                HarnessError::AllocationFailure(_) => e,
                other => HarnessError::AllocationFailure(other.to_string()),
            })?;
        debug!(buffer = %id, %access, bytes = byte_size, "Allocated device buffer");
        self.buffers.push(id);
        Ok(DeviceBuffer::new(id, access, byte_size))
    }

    /// Releases a device buffer. Releasing twice is a no-op.
    pub fn release_buffer(&mut self, buffer: &mut DeviceBuffer) -> HarnessResult<()> {
        if buffer.released {
            return Ok(());
        }
        take_owned(&mut self.buffers, buffer.id, "buffer")?;
        buffer.released = true;
        self.backend.release_buffer(buffer.id)
    }

    /// Builds `source` with `options`.
    ///
    /// Any status other than `Success` releases the program object and
    /// returns `BuildFailure` carrying the full build log.
    pub fn build_program(&mut self, source: &str, options: &str) -> HarnessResult<Program> {
        info!(options, "Building program");
        let (id, report) = self.backend.build_program(self.context, source, options)?;
        self.programs.push(id);

        if !report.status.is_success() {
            if let Err(e) = take_owned(&mut self.programs, id, "program")
                .and_then(|()| self.backend.release_program(id))
            {
                warn!(program = %id, error = %e, "Failed to release program after build failure");
            }
            return Err(HarnessError::BuildFailure {
                status: report.status,
                log: report.log,
            });
        }

        if !report.log.trim().is_empty() {
            warn!(log = %report.log.trim(), "Program built with diagnostics");
        }
        Ok(Program::new(id, report))
    }

    /// Creates a kernel for entry point `name`.
    pub fn create_kernel(&mut self, program: &Program, name: &str) -> HarnessResult<CompiledKernel> {
        if program.released {
            return Err(HarnessError::AccessViolation(format!(
                "cannot create kernel '{name}' from released program {}",
                program.id
            )));
        }
        let id = self.backend.create_kernel(program.id, name)?;
        self.kernels.push(id);
        let arg_count = self.backend.kernel_arg_count(id)?;
        debug!(kernel = name, arg_count, "Created kernel");
        Ok(CompiledKernel::new(id, name, arg_count))
    }

    /// Releases a kernel. Releasing twice is a no-op.
    pub fn release_kernel(&mut self, kernel: &mut CompiledKernel) -> HarnessResult<()> {
        if kernel.released {
            return Ok(());
        }
        take_owned(&mut self.kernels, kernel.id, "kernel")?;
        kernel.released = true;
        self.backend.release_kernel(kernel.id)
    }

    /// Releases a program. Releasing twice is a no-op.
    pub fn release_program(&mut self, program: &mut Program) -> HarnessResult<()> {
        if program.released {
            return Ok(());
        }
        take_owned(&mut self.programs, program.id, "program")?;
        program.released = true;
        self.backend.release_program(program.id)
    }

    /// Releases a queue. Releasing twice is a no-op.
    pub fn release_queue(&mut self, queue: &mut CommandQueue) -> HarnessResult<()> {
        if queue.released {
            return Ok(());
        }
        take_owned(&mut self.queues, queue.id, "queue")?;
        queue.released = true;
        self.backend.release_queue(queue.id)
    }

    /// Releases everything still live, then the context itself.
    ///
    /// Returns the first failure; later steps still run.
    pub fn shutdown(mut self) -> HarnessResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> HarnessResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut first_error: Option<HarnessError> = None;
        let mut record = |result: HarnessResult<()>| {
            if let Err(e) = result {
                warn!(error = %e, "Release failed during teardown");
                first_error.get_or_insert(e);
            }
        };

        for id in std::mem::take(&mut self.kernels) {
            debug!(kernel = %id, "Releasing kernel");
            record(self.backend.release_kernel(id));
        }
        for id in std::mem::take(&mut self.programs) {
            debug!(program = %id, "Releasing program");
            record(self.backend.release_program(id));
        }
        for id in std::mem::take(&mut self.buffers) {
            debug!(buffer = %id, "Releasing buffer");
            record(self.backend.release_buffer(id));
        }
        for id in std::mem::take(&mut self.queues) {
            info!(queue = %id, "Releasing command queue");
            record(self.backend.release_queue(id));
        }
        info!(context = %self.context, "Releasing context");
        record(self.backend.release_context(self.context));

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ComputeContext {
    fn drop(&mut self) {
        if !self.torn_down {
            let _ = self.teardown();
        }
    }
}

/// Removes `id` from a live list, failing if this context never created it.
fn take_owned<T: PartialEq + std::fmt::Display>(live: &mut Vec<T>, id: T, kind: &str) -> HarnessResult<()> {
    match live.iter().position(|x| *x == id) {
        Some(pos) => {
            live.swap_remove(pos);
            Ok(())
        }
        None => Err(HarnessError::AccessViolation(format!(
            "{kind} {id} does not belong to this context"
        ))),
    }
}
