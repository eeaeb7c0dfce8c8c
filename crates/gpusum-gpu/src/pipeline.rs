//! Upload → dispatch → readback over one in-order queue.
//!
//! Each phase is followed by an explicit `finish` barrier, so phase
//! timings are wall-clock and no phase observes a half-finished
//! predecessor. The first failing step aborts the run; the queue is then
//! drained so no transfer still references host memory on return.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use gpusum_types::{HarnessError, HarnessResult};

use crate::buffers::{DeviceBuffer, HostBuffer};
use crate::context::{CommandQueue, ComputeContext};
use crate::program::CompiledKernel;

/// A 1-D execution domain: one work item per output element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemDomain {
    size: usize,
}

impl ProblemDomain {
    /// Rejects an empty domain.
    pub fn new(size: usize) -> HarnessResult<Self> {
        if size == 0 {
            return Err(HarnessError::InvalidConfig(
                "problem domain must have at least one work item".into(),
            ));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A host buffer and the device buffer it is uploaded into.
#[derive(Debug, Clone, Copy)]
pub struct KernelInput<'a> {
    pub host: &'a HostBuffer<f32>,
    pub device: &'a DeviceBuffer,
}

/// The device buffer the kernel writes and the host buffer it is read into.
#[derive(Debug)]
pub struct KernelOutput<'a> {
    pub device: &'a DeviceBuffer,
    pub host: &'a mut HostBuffer<f32>,
}

/// Named points in the command stream, used in `DispatchFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Upload,
    AwaitUpload,
    Dispatch,
    AwaitDispatch,
    Readback,
    AwaitReadback,
}

impl PipelineStep {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStep::Upload => "upload",
            PipelineStep::AwaitUpload => "await_upload",
            PipelineStep::Dispatch => "dispatch",
            PipelineStep::AwaitDispatch => "await_dispatch",
            PipelineStep::Readback => "readback",
            PipelineStep::AwaitReadback => "await_readback",
        }
    }

    fn fail(self, reason: impl std::fmt::Display) -> HarnessError {
        HarnessError::DispatchFailure {
            step: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Timings and transfer volume of one successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completion {
    pub upload: Duration,
    pub dispatch: Duration,
    pub readback: Duration,
    pub bytes_uploaded: usize,
    pub bytes_downloaded: usize,
}

impl Completion {
    pub fn total(&self) -> Duration {
        self.upload + self.dispatch + self.readback
    }
}

/// Runs a bound kernel over a domain.
pub struct KernelPipeline;

impl KernelPipeline {
    /// Uploads every input, dispatches `kernel` over `domain`, and reads
    /// the output back into host memory.
    ///
    /// Every input and the output must be bound to `kernel`, sized to the
    /// domain, and declared with an access mode that permits the transfer.
    /// Every buffer bound to `kernel` must be one of them.
    /// These are checked before anything is enqueued.
    pub fn run(
        ctx: &mut ComputeContext,
        queue: &CommandQueue,
        kernel: &CompiledKernel,
        domain: ProblemDomain,
        inputs: &[KernelInput<'_>],
        output: KernelOutput<'_>,
    ) -> HarnessResult<Completion> {
        Self::validate(queue, kernel, domain, inputs, &output)?;

        let result = Self::execute(ctx, queue, kernel, domain, inputs, output);
        if let Err(e) = &result {
            warn!(error = %e, "Pipeline aborted, draining queue");
            if let Err(drain) = ctx.backend_mut().finish(queue.id()) {
                warn!(error = %drain, "Queue drain failed");
            }
        }
        result
    }

    fn validate(
        queue: &CommandQueue,
        kernel: &CompiledKernel,
        domain: ProblemDomain,
        inputs: &[KernelInput<'_>],
        output: &KernelOutput<'_>,
    ) -> HarnessResult<()> {
        if queue.is_released() {
            return Err(HarnessError::AccessViolation(format!(
                "queue {} has been released",
                queue.id()
            )));
        }
        if kernel.is_released() {
            return Err(HarnessError::AccessViolation(format!(
                "kernel '{}' has been released",
                kernel.name()
            )));
        }
        if let Some(slot) = kernel.first_unbound() {
            return Err(PipelineStep::Dispatch.fail(format_args!(
                "kernel '{}' argument slot {slot} is unbound",
                kernel.name()
            )));
        }

        let bound = kernel.bound_buffers();
        let n = domain.size();
        let check_device = |device: &DeviceBuffer, role: &str| -> HarnessResult<()> {
            if device.is_released() {
                return Err(HarnessError::AccessViolation(format!(
                    "{role} buffer {} has been released",
                    device.id()
                )));
            }
            if device.len() != n {
                return Err(HarnessError::SizeMismatch {
                    expected: n,
                    actual: device.len(),
                });
            }
            if !bound.contains(&device.id()) {
                return Err(HarnessError::InvalidConfig(format!(
                    "{role} buffer {} is not bound to kernel '{}'",
                    device.id(),
                    kernel.name()
                )));
            }
            Ok(())
        };

        for input in inputs {
            check_device(input.device, "input")?;
            if !input.device.access().accepts_upload() {
                return Err(HarnessError::AccessViolation(format!(
                    "cannot upload into {} buffer {}",
                    input.device.access(),
                    input.device.id()
                )));
            }
            if input.host.len() != n {
                return Err(HarnessError::SizeMismatch {
                    expected: n,
                    actual: input.host.len(),
                });
            }
            if input.device.id() == output.device.id() {
                return Err(HarnessError::AccessViolation(format!(
                    "buffer {} is both an input and the output",
                    input.device.id()
                )));
            }
        }

        // The kernel would read a bound buffer nobody uploaded.
        for id in &bound {
            if *id != output.device.id() && !inputs.iter().any(|input| input.device.id() == *id) {
                return Err(HarnessError::AccessViolation(format!(
                    "buffer {id} is bound to kernel '{}' but is neither an input nor the output",
                    kernel.name()
                )));
            }
        }

        check_device(output.device, "output")?;
        if !output.device.access().accepts_readback() {
            return Err(HarnessError::AccessViolation(format!(
                "cannot read back from {} buffer {}",
                output.device.access(),
                output.device.id()
            )));
        }
        if output.host.len() != n {
            return Err(HarnessError::SizeMismatch {
                expected: n,
                actual: output.host.len(),
            });
        }
        Ok(())
    }

    fn execute(
        ctx: &mut ComputeContext,
        queue: &CommandQueue,
        kernel: &CompiledKernel,
        domain: ProblemDomain,
        inputs: &[KernelInput<'_>],
        output: KernelOutput<'_>,
    ) -> HarnessResult<Completion> {
        let backend = ctx.backend_mut();
        let queue_id = queue.id();
        let mut completion = Completion::default();

        let started = Instant::now();
        for input in inputs {
            let data = input.host.as_slice();
            // SAFETY: `inputs` borrows the host buffers for the whole run,
            // and every return path finishes the queue first.
            unsafe { backend.enqueue_write(queue_id, input.device.id(), data) }
                .map_err(|e| PipelineStep::Upload.fail(e))?;
            completion.bytes_uploaded += input.host.byte_size();
        }
        backend
            .finish(queue_id)
            .map_err(|e| PipelineStep::AwaitUpload.fail(e))?;
        completion.upload = started.elapsed();
        debug!(bytes = completion.bytes_uploaded, elapsed = ?completion.upload, "Upload complete");

        let started = Instant::now();
        let bindings = kernel
            .bindings()
            .map_err(|slot| PipelineStep::Dispatch.fail(format_args!("argument slot {slot} is unbound")))?;
        for (index, arg) in bindings {
            backend
                .set_kernel_arg(kernel.id(), index, arg)
                .map_err(|e| PipelineStep::Dispatch.fail(e))?;
        }
        backend
            .enqueue_dispatch(queue_id, kernel.id(), domain.size())
            .map_err(|e| PipelineStep::Dispatch.fail(e))?;
        backend
            .finish(queue_id)
            .map_err(|e| PipelineStep::AwaitDispatch.fail(e))?;
        completion.dispatch = started.elapsed();
        debug!(kernel = kernel.name(), work_items = domain.size(), elapsed = ?completion.dispatch, "Dispatch complete");

        let started = Instant::now();
        let out = output.host.as_mut_slice();
        // SAFETY: `output.host` is mutably borrowed until this function
        // returns, and every return path finishes the queue first.
        unsafe { backend.enqueue_read(queue_id, output.device.id(), out) }
            .map_err(|e| PipelineStep::Readback.fail(e))?;
        backend
            .finish(queue_id)
            .map_err(|e| PipelineStep::AwaitReadback.fail(e))?;
        completion.readback = started.elapsed();
        completion.bytes_downloaded = output.host.byte_size();
        debug!(bytes = completion.bytes_downloaded, elapsed = ?completion.readback, "Readback complete");

        info!(total = ?completion.total(), "Pipeline complete");
        Ok(completion)
    }
}
