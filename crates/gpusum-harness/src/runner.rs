//! Harness runner: executes one windowed-sum run and collects metrics.
//!
//! Control flow:
//!
//! ```text
//! resolve device → context + queue → inputs → device buffers → build
//!   → upload / dispatch / readback → host reference → compare → teardown
//! ```
//!
//! Any failure returns immediately; the context's `Drop` releases whatever
//! was created.

use std::time::Instant;

use tracing::info;

use gpusum_gpu::{
    load_kernel_source, ComputeBackend, ComputeContext, ComputeDevice, DeviceResolver, HostBuffer,
    Inventory, KernelInput, KernelOutput, KernelPipeline, ProblemDomain, SelectionPolicy,
};
use gpusum_reference::{compare, generate_inputs, windowed_sum, Comparison};
use gpusum_telemetry::{EventBus, EventKind};
use gpusum_types::constants::WINDOW_RADIUS;
use gpusum_types::{AccessMode, HarnessError, HarnessResult};

use crate::config::HarnessConfig;
use crate::metrics::RunMetrics;

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub inventory: Inventory,
    pub device: ComputeDevice,
    pub comparison: Comparison,
    /// Build log of the successful build (warnings, if any).
    pub build_log: String,
    pub metrics: RunMetrics,
}

/// Enumeration result and the device a run would use.
#[derive(Debug, Clone)]
pub struct DeviceSurvey {
    pub inventory: Inventory,
    pub selected: Option<ComputeDevice>,
}

/// Runs the harness and collects metrics.
pub struct HarnessRunner;

impl HarnessRunner {
    /// Enumerate devices and report which one `policy` selects.
    pub fn inventory(backend: &mut dyn ComputeBackend, policy: SelectionPolicy) -> HarnessResult<DeviceSurvey> {
        let resolver = DeviceResolver::new(policy);
        let inventory = resolver.enumerate(backend)?;
        let selected = match resolver.choose(&inventory) {
            Ok(device) => Some(device),
            Err(HarnessError::DeviceNotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(DeviceSurvey { inventory, selected })
    }

    /// Build the configured kernel and return the build log.
    ///
    /// A failing build is `BuildFailure` carrying the full log.
    pub fn build_only(
        config: &HarnessConfig,
        mut backend: Box<dyn ComputeBackend>,
        bus: &mut EventBus,
    ) -> HarnessResult<String> {
        let resolver = DeviceResolver::new(config.selection);
        let device = resolver.resolve(backend.as_mut())?;
        let source = load_kernel_source(&config.kernel_path)?;

        let mut ctx = ComputeContext::create(backend, device)?;
        let program = Self::build(&mut ctx, &source, config, bus)?;
        ctx.create_kernel(&program, &config.entry_point)?;
        let log = program.build_log().to_string();
        ctx.shutdown()?;
        bus.flush();
        Ok(log)
    }

    /// Run the full harness.
    ///
    /// A mismatch is reported in the returned [`RunReport`], not as an
    /// error.
    pub fn run(
        config: &HarnessConfig,
        mut backend: Box<dyn ComputeBackend>,
        bus: &mut EventBus,
    ) -> HarnessResult<RunReport> {
        config.validate()?;
        let total_start = Instant::now();
        let backend_name = backend.name().to_string();

        // Device
        let resolver = DeviceResolver::new(config.selection);
        let inventory = resolver.enumerate(backend.as_mut())?;
        bus.emit(EventKind::Inventory {
            platforms: inventory.platform_count(),
            devices: inventory.device_count(),
        });
        let device = match resolver.choose(&inventory) {
            Ok(device) => device,
            Err(e) => {
                bus.flush();
                return Err(e);
            }
        };
        bus.emit(EventKind::DeviceSelected {
            name: device.name.clone(),
            version: device.version.clone(),
            platform: device.platform_name.clone(),
        });
        bus.flush();

        let source = load_kernel_source(&config.kernel_path)?;

        // Context and queue
        let mut ctx = ComputeContext::create(backend, device.clone())?;
        bus.emit(EventKind::ContextCreated {
            device: device.name.clone(),
        });
        let queue = ctx.create_queue()?;
        bus.emit(EventKind::QueueCreated);
        bus.flush();

        // Host memory
        let n = config.problem_size;
        let inputs = generate_inputs(n, config.seed, config.input_max)?;
        let mut host_a = HostBuffer::from_vec(inputs.a);
        let mut host_b = HostBuffer::from_vec(inputs.b);
        let mut host_out = HostBuffer::<f32>::allocate(n)?;
        for (label, bytes) in [
            ("host:a", host_a.byte_size()),
            ("host:b", host_b.byte_size()),
            ("host:out", host_out.byte_size()),
        ] {
            bus.emit(EventKind::ResourceAllocated {
                resource: label.to_string(),
                bytes,
            });
        }

        // Device memory
        let bytes = host_out.byte_size();
        let dev_a = ctx.allocate_device(AccessMode::ReadOnly, bytes)?;
        let dev_b = ctx.allocate_device(AccessMode::ReadOnly, bytes)?;
        let dev_out = ctx.allocate_device(AccessMode::WriteOnly, bytes)?;
        for label in ["device:a", "device:b", "device:out"] {
            bus.emit(EventKind::ResourceAllocated {
                resource: label.to_string(),
                bytes,
            });
        }
        bus.flush();

        // Build and bind
        let program = Self::build(&mut ctx, &source, config, bus)?;
        let mut kernel = ctx.create_kernel(&program, &config.entry_point)?;
        kernel.bind_buffer(0, &dev_a)?;
        kernel.bind_buffer(1, &dev_b)?;
        kernel.bind_buffer(2, &dev_out)?;

        // Device execution
        let completion = KernelPipeline::run(
            &mut ctx,
            &queue,
            &kernel,
            ProblemDomain::new(n)?,
            &[
                KernelInput {
                    host: &host_a,
                    device: &dev_a,
                },
                KernelInput {
                    host: &host_b,
                    device: &dev_b,
                },
            ],
            KernelOutput {
                device: &dev_out,
                host: &mut host_out,
            },
        )?;
        for (step, seconds, bytes) in [
            ("upload", completion.upload.as_secs_f64(), completion.bytes_uploaded),
            ("dispatch", completion.dispatch.as_secs_f64(), 0),
            ("readback", completion.readback.as_secs_f64(), completion.bytes_downloaded),
        ] {
            bus.emit(EventKind::PipelineStep {
                step: step.to_string(),
                seconds,
                bytes,
            });
        }
        bus.flush();

        // Host reference
        let reference_start = Instant::now();
        let reference = windowed_sum(host_a.as_slice(), host_b.as_slice(), WINDOW_RADIUS)?;
        let reference_time = reference_start.elapsed().as_secs_f64();
        bus.emit(EventKind::ReferenceFinished {
            seconds: reference_time,
        });

        // Validation
        let comparison = compare(&reference, host_out.as_slice(), config.epsilon);
        bus.emit(EventKind::ValidationFinished {
            matched: comparison.is_match(),
            first_mismatch: comparison.mismatch_index(),
        });
        info!(result = %comparison, "Validation finished");
        bus.flush();

        // Teardown
        let build_log = program.build_log().to_string();
        let live = ctx.live_resources();
        ctx.shutdown()?;
        for (resource, count) in [
            ("kernel", live.kernels),
            ("program", live.programs),
            ("device buffer", live.buffers),
            ("command queue", live.queues),
            ("context", 1),
        ] {
            if count > 0 {
                bus.emit(EventKind::ResourceReleased {
                    resource: resource.to_string(),
                    count,
                });
            }
        }
        let mut host_released = 0;
        for buffer in [&mut host_a, &mut host_b, &mut host_out] {
            if !buffer.is_released() {
                buffer.release();
                host_released += 1;
            }
        }
        bus.emit(EventKind::ResourceReleased {
            resource: "host buffer".to_string(),
            count: host_released,
        });
        bus.flush();

        let metrics = RunMetrics {
            backend: backend_name,
            device: device.name.clone(),
            problem_size: n,
            upload_time: completion.upload.as_secs_f64(),
            dispatch_time: completion.dispatch.as_secs_f64(),
            readback_time: completion.readback.as_secs_f64(),
            reference_time,
            total_wall_time: total_start.elapsed().as_secs_f64(),
            bytes_uploaded: completion.bytes_uploaded,
            bytes_downloaded: completion.bytes_downloaded,
            matched: comparison.is_match(),
            first_mismatch: comparison.mismatch_index(),
        };

        Ok(RunReport {
            inventory,
            device,
            comparison,
            build_log,
            metrics,
        })
    }

    fn build(
        ctx: &mut ComputeContext,
        source: &str,
        config: &HarnessConfig,
        bus: &mut EventBus,
    ) -> HarnessResult<gpusum_gpu::Program> {
        let result = ctx.build_program(source, &config.build_options);
        let (status, log_lines) = match &result {
            Ok(program) => ("success".to_string(), program.build_log().lines().count()),
            Err(HarnessError::BuildFailure { status, log }) => (status.to_string(), log.lines().count()),
            Err(_) => ("error".to_string(), 0),
        };
        bus.emit(EventKind::BuildFinished { status, log_lines });
        bus.flush();
        result
    }
}
