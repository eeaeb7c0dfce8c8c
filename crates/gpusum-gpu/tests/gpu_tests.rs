//! Integration tests for gpusum-gpu.

use gpusum_gpu::{
    load_kernel_source, CommandQueue, CompiledKernel, ComputeBackend, ComputeContext,
    DeviceBuffer, DeviceResolver, EmulatedBackend, FaultPoint, HostBuffer, KernelArg,
    KernelInput, KernelOutput, KernelPipeline, ObjectKind, PipelineStep, ProblemDomain, Program,
    SelectionPolicy,
};
use gpusum_types::constants::{DEFAULT_BUILD_OPTIONS, KERNEL_ENTRY_POINT};
use gpusum_types::{AccessMode, BuildStatus, DeviceClass, HarnessError};

const SUM_CL: &str = include_str!("../../../kernels/sum.cl");

fn open(backend: EmulatedBackend) -> ComputeContext {
    let mut backend: Box<dyn ComputeBackend> = Box::new(backend);
    let device = DeviceResolver::default().resolve(backend.as_mut()).unwrap();
    ComputeContext::create(backend, device).unwrap()
}

struct Bound {
    queue: CommandQueue,
    _program: Program,
    kernel: CompiledKernel,
    a: DeviceBuffer,
    b: DeviceBuffer,
    out: DeviceBuffer,
}

fn bind_sum(ctx: &mut ComputeContext, n: usize) -> Bound {
    let queue = ctx.create_queue().unwrap();
    let bytes = n * std::mem::size_of::<f32>();
    let a = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let b = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let out = ctx.allocate_device(AccessMode::WriteOnly, bytes).unwrap();
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, KERNEL_ENTRY_POINT).unwrap();
    kernel.bind_buffer(0, &a).unwrap();
    kernel.bind_buffer(1, &b).unwrap();
    kernel.bind_buffer(2, &out).unwrap();
    Bound {
        queue,
        _program: program,
        kernel,
        a,
        b,
        out,
    }
}

fn naive(a: &[f32], b: &[f32]) -> Vec<f32> {
    let n = a.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0f32;
            for j in -20..=20 {
                let k = (i + j).clamp(0, n - 1) as usize;
                acc += a[k] * a[k] + b[k] * b[k];
            }
            acc / 41.0
        })
        .collect()
}

fn run_sum(
    ctx: &mut ComputeContext,
    bound: &Bound,
    a: &HostBuffer<f32>,
    b: &HostBuffer<f32>,
    out: &mut HostBuffer<f32>,
) -> Result<gpusum_gpu::Completion, HarnessError> {
    let domain = ProblemDomain::new(out.len())?;
    KernelPipeline::run(
        ctx,
        &bound.queue,
        &bound.kernel,
        domain,
        &[
            KernelInput { host: a, device: &bound.a },
            KernelInput { host: b, device: &bound.b },
        ],
        KernelOutput { device: &bound.out, host: out },
    )
}

fn ramp(n: usize, scale: f32) -> HostBuffer<f32> {
    let mut buf = HostBuffer::allocate(n).unwrap();
    buf.fill_with(|i| (i % 10) as f32 * scale);
    buf
}

// ─── Host Buffer Tests ───────────────────────────────────────

#[test]
fn host_buffer_allocate() {
    let buf = HostBuffer::<f32>::allocate(100).unwrap();
    assert_eq!(buf.len(), 100);
    assert_eq!(buf.byte_size(), 400);
    assert!(buf.as_slice().iter().all(|&x| x == 0.0));
}

#[test]
fn host_buffer_copy_requires_equal_length() {
    let mut buf = HostBuffer::<f32>::allocate(3).unwrap();
    buf.copy_from_slice(&[7.0, 8.0, 9.0]).unwrap();
    assert_eq!(buf.as_slice(), &[7.0, 8.0, 9.0]);

    let err = buf.copy_from_slice(&[1.0]).unwrap_err();
    assert!(matches!(err, HarnessError::SizeMismatch { expected: 3, actual: 1 }));
}

#[test]
fn host_buffer_release_is_idempotent() {
    let mut buf = HostBuffer::from_vec(vec![1.0f32, 2.0]);
    buf.release();
    buf.release();
    assert!(buf.is_released());
    assert_eq!(buf.len(), 0);
}

#[test]
fn host_buffer_allocation_failure_is_reported() {
    let err = HostBuffer::<f32>::allocate(usize::MAX / 2).unwrap_err();
    assert!(matches!(err, HarnessError::AllocationFailure(_)));
}

#[test]
#[should_panic(expected = "after release")]
fn host_buffer_access_after_release_panics() {
    let mut buf = HostBuffer::from_vec(vec![1.0f32]);
    buf.release();
    let _ = buf.as_slice();
}

// ─── Device Resolver Tests ───────────────────────────────────

fn two_gpu_backend() -> EmulatedBackend {
    EmulatedBackend::builder()
        .platform("Vendor A", "Platform A", "OpenCL 1.2")
        .device("Vendor A", "CPU A", "OpenCL 1.2", DeviceClass::Cpu)
        .device("Vendor A", "GPU A", "OpenCL 1.2", DeviceClass::Gpu)
        .platform("Vendor B", "Platform B", "OpenCL 3.0")
        .device("Vendor B", "GPU B", "OpenCL 3.0", DeviceClass::Gpu)
        .device("Vendor B", "Accel B", "OpenCL 3.0", DeviceClass::Accelerator)
        .build()
}

#[test]
fn resolver_picks_last_gpu_by_default() {
    let mut backend = two_gpu_backend();
    let device = DeviceResolver::default().resolve(&mut backend).unwrap();
    assert_eq!(device.name, "GPU B");
    assert_eq!(device.platform_name, "Platform B");
    assert_eq!(device.class, DeviceClass::Gpu);
}

#[test]
fn resolver_first_gpu_policy() {
    let mut backend = two_gpu_backend();
    let resolver = DeviceResolver::new(SelectionPolicy::FirstGpu);
    let device = resolver.resolve(&mut backend).unwrap();
    assert_eq!(device.name, "GPU A");
}

#[test]
fn resolver_ignores_non_gpu_devices() {
    let mut backend = EmulatedBackend::builder()
        .platform("Vendor", "CPU only", "OpenCL 1.2")
        .device("Vendor", "Host CPU", "OpenCL 1.2", DeviceClass::Cpu)
        .build();
    let err = DeviceResolver::default().resolve(&mut backend).unwrap_err();
    assert!(matches!(err, HarnessError::DeviceNotFound { platforms: 1 }));
}

#[test]
fn resolver_with_no_platforms() {
    let mut backend = EmulatedBackend::builder().build();
    let err = DeviceResolver::default().resolve(&mut backend).unwrap_err();
    assert!(matches!(err, HarnessError::DeviceNotFound { platforms: 0 }));
}

#[test]
fn inventory_lines() {
    let mut backend = two_gpu_backend();
    let inventory = DeviceResolver::default().enumerate(&mut backend).unwrap();
    assert_eq!(inventory.platform_count(), 2);
    assert_eq!(inventory.device_count(), 4);

    let lines = inventory.lines();
    assert_eq!(lines[0], "Found 2 platforms:");
    assert_eq!(lines[1], "    Vendor A - Platform A - OpenCL 1.2");
    assert_eq!(lines[2], "        Vendor A - CPU A - OpenCL 1.2 (CPU)");
    assert_eq!(lines[6], "        Vendor B - Accel B - OpenCL 3.0 (accelerator)");
    assert_eq!(lines.len(), 7);
}

// ─── Lifecycle Tests ─────────────────────────────────────────

#[test]
fn shutdown_releases_in_dependency_order() {
    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    let mut ctx = open(backend);
    let _bound = bind_sum(&mut ctx, 64);
    assert_eq!(ctx.live_resources().total(), 6);

    ctx.shutdown().unwrap();
    assert_eq!(
        journal.release_order(),
        vec![
            ObjectKind::Kernel,
            ObjectKind::Program,
            ObjectKind::Buffer,
            ObjectKind::Buffer,
            ObjectKind::Buffer,
            ObjectKind::Queue,
            ObjectKind::Context,
        ]
    );
    assert_eq!(journal.live(), 0);
}

#[test]
fn drop_without_shutdown_still_releases() {
    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    {
        let mut ctx = open(backend);
        let _bound = bind_sum(&mut ctx, 16);
        assert!(journal.live() > 0);
    }
    assert_eq!(journal.live(), 0);
}

#[test]
fn explicit_release_is_idempotent() {
    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    let mut ctx = open(backend);
    let mut bound = bind_sum(&mut ctx, 16);

    ctx.release_kernel(&mut bound.kernel).unwrap();
    ctx.release_kernel(&mut bound.kernel).unwrap();
    ctx.release_buffer(&mut bound.a).unwrap();
    ctx.release_buffer(&mut bound.a).unwrap();
    assert!(bound.a.is_released());
    assert_eq!(ctx.live_resources().buffers, 2);
    assert_eq!(ctx.live_resources().kernels, 0);

    ctx.shutdown().unwrap();
    let released_buffers = journal
        .release_order()
        .into_iter()
        .filter(|k| *k == ObjectKind::Buffer)
        .count();
    assert_eq!(released_buffers, 3);
    assert_eq!(journal.live(), 0);
}

#[test]
fn zero_byte_device_allocation_rejected() {
    let mut ctx = open(EmulatedBackend::new());
    let err = ctx.allocate_device(AccessMode::ReadOnly, 0).unwrap_err();
    assert!(matches!(err, HarnessError::AllocationFailure(_)));
    let err = ctx.allocate_device(AccessMode::ReadOnly, 6).unwrap_err();
    assert!(matches!(err, HarnessError::AllocationFailure(_)));
}

#[test]
fn device_memory_limit_reports_allocation_failure() {
    let backend = EmulatedBackend::builder()
        .device("gpusum", "Small GPU", "OpenCL 1.2", DeviceClass::Gpu)
        .device_memory(1024)
        .build();
    let mut ctx = open(backend);
    let first = ctx.allocate_device(AccessMode::ReadOnly, 1024).unwrap();
    assert_eq!(first.len(), 256);
    let err = ctx.allocate_device(AccessMode::ReadOnly, 4).unwrap_err();
    assert!(matches!(err, HarnessError::AllocationFailure(ref m) if m.contains("CL_MEM_OBJECT_ALLOCATION_FAILURE")));
}

// ─── Build Tests ─────────────────────────────────────────────

#[test]
fn build_failure_carries_log_and_releases_program() {
    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    let mut ctx = open(backend);
    let broken = "__kernel void sum(__global const float* a { }";
    let err = ctx.build_program(broken, DEFAULT_BUILD_OPTIONS).unwrap_err();
    match err {
        HarnessError::BuildFailure { status, log } => {
            assert_eq!(status, BuildStatus::Error);
            assert!(log.contains("<source>:1:"));
            assert!(log.contains("error:"));
        }
        other => panic!("expected BuildFailure, got {other:?}"),
    }
    assert_eq!(ctx.live_resources().programs, 0);
    assert!(journal.release_order().contains(&ObjectKind::Program));
}

#[test]
fn incomplete_build_status_is_fatal() {
    for forced in [BuildStatus::InProgress, BuildStatus::None] {
        let backend = EmulatedBackend::builder()
            .device("gpusum", "Slow GPU", "OpenCL 1.2", DeviceClass::Gpu)
            .build_status(forced)
            .build();
        let journal = backend.journal();
        let mut ctx = open(backend);

        let err = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap_err();
        assert!(
            matches!(err, HarnessError::BuildFailure { status, .. } if status == forced),
            "{forced:?}: got {err:?}"
        );
        assert_eq!(ctx.live_resources().programs, 0);
        assert!(journal.release_order().contains(&ObjectKind::Program));
        ctx.shutdown().unwrap();
        assert_eq!(journal.live(), 0);
    }
}

#[test]
fn build_rejects_unknown_option() {
    let mut ctx = open(EmulatedBackend::new());
    let err = ctx.build_program(SUM_CL, "-cl-not-an-option").unwrap_err();
    assert!(err.to_string().contains("unknown argument: '-cl-not-an-option'"));
}

#[test]
fn unknown_entry_point_fails_build() {
    let mut ctx = open(EmulatedBackend::new());
    let src = "__kernel void product(__global float* x) { x[0] = 1.0f; }";
    let err = ctx.build_program(src, "").unwrap_err();
    assert!(err.to_string().contains("no native implementation"));
}

#[test]
fn kernel_reports_arg_count() {
    let mut ctx = open(EmulatedBackend::new());
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    assert!(program.build_log().is_empty());
    let kernel = ctx.create_kernel(&program, "sum").unwrap();
    assert_eq!(kernel.arg_count(), 3);
    assert_eq!(kernel.first_unbound(), Some(0));
}

#[test]
fn load_kernel_source_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sum.cl");
    std::fs::write(&path, SUM_CL).unwrap();
    assert_eq!(load_kernel_source(&path).unwrap(), SUM_CL);

    let err = load_kernel_source(dir.path().join("missing.cl")).unwrap_err();
    assert!(matches!(err, HarnessError::Io(_)));
    assert!(err.to_string().contains("missing.cl"));
}

// ─── Pipeline Tests ──────────────────────────────────────────

#[test]
fn pipeline_matches_naive_window() {
    let n = 300;
    let mut ctx = open(EmulatedBackend::new());
    let bound = bind_sum(&mut ctx, n);
    let a = ramp(n, 1.0);
    let b = ramp(n, 0.5);
    let mut out = HostBuffer::allocate(n).unwrap();

    let completion = run_sum(&mut ctx, &bound, &a, &b, &mut out).unwrap();
    assert_eq!(completion.bytes_uploaded, 2 * n * 4);
    assert_eq!(completion.bytes_downloaded, n * 4);

    let expected = naive(a.as_slice(), b.as_slice());
    for (i, (got, want)) in out.as_slice().iter().zip(&expected).enumerate() {
        assert!((got - want).abs() < 1e-4, "index {i}: {got} vs {want}");
    }
    ctx.shutdown().unwrap();
}

#[test]
fn pipeline_single_element_domain() {
    let mut ctx = open(EmulatedBackend::new());
    let bound = bind_sum(&mut ctx, 1);
    let a = HostBuffer::from_vec(vec![2.0f32]);
    let b = HostBuffer::from_vec(vec![1.0f32]);
    let mut out = HostBuffer::allocate(1).unwrap();
    run_sum(&mut ctx, &bound, &a, &b, &mut out).unwrap();
    assert!((out.as_slice()[0] - 5.0).abs() < 1e-5);
}

#[test]
fn pipeline_rejects_unbound_slot() {
    let mut ctx = open(EmulatedBackend::new());
    let n = 8;
    let bytes = n * 4;
    let queue = ctx.create_queue().unwrap();
    let a = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let b = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let out = ctx.allocate_device(AccessMode::WriteOnly, bytes).unwrap();
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, "sum").unwrap();
    kernel.bind_buffer(0, &a).unwrap();
    kernel.bind_buffer(2, &out).unwrap();

    let ha = ramp(n, 1.0);
    let hb = ramp(n, 1.0);
    let mut hout = HostBuffer::allocate(n).unwrap();
    let err = KernelPipeline::run(
        &mut ctx,
        &queue,
        &kernel,
        ProblemDomain::new(n).unwrap(),
        &[
            KernelInput { host: &ha, device: &a },
            KernelInput { host: &hb, device: &b },
        ],
        KernelOutput { device: &out, host: &mut hout },
    )
    .unwrap_err();
    assert!(matches!(err, HarnessError::DispatchFailure { ref step, .. } if step == "dispatch"));
}

#[test]
fn kernel_bind_errors() {
    let mut ctx = open(EmulatedBackend::new());
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, "sum").unwrap();
    let mut buf = ctx.allocate_device(AccessMode::ReadOnly, 16).unwrap();

    assert!(matches!(
        kernel.bind_buffer(3, &buf),
        Err(HarnessError::InvalidConfig(_))
    ));
    assert!(matches!(
        kernel.bind_scalar(0, KernelArg::Buffer(buf.id())),
        Err(HarnessError::AccessViolation(_))
    ));
    ctx.release_buffer(&mut buf).unwrap();
    assert!(matches!(
        kernel.bind_buffer(0, &buf),
        Err(HarnessError::AccessViolation(_))
    ));
}

#[test]
fn pipeline_rejects_size_mismatch() {
    let n = 32;
    let mut ctx = open(EmulatedBackend::new());
    let bound = bind_sum(&mut ctx, n);
    let a = ramp(n - 1, 1.0);
    let b = ramp(n, 1.0);
    let mut out = HostBuffer::allocate(n).unwrap();
    let err = run_sum(&mut ctx, &bound, &a, &b, &mut out).unwrap_err();
    assert!(matches!(err, HarnessError::SizeMismatch { expected: 32, actual: 31 }));
}

#[test]
fn pipeline_rejects_readback_from_read_only_output() {
    let n = 16;
    let bytes = n * 4;
    let mut ctx = open(EmulatedBackend::new());
    let queue = ctx.create_queue().unwrap();
    let a = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let b = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let out = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, "sum").unwrap();
    kernel.bind_buffer(0, &a).unwrap();
    kernel.bind_buffer(1, &b).unwrap();
    kernel.bind_buffer(2, &out).unwrap();

    let ha = ramp(n, 1.0);
    let hb = ramp(n, 1.0);
    let mut hout = HostBuffer::allocate(n).unwrap();
    let err = KernelPipeline::run(
        &mut ctx,
        &queue,
        &kernel,
        ProblemDomain::new(n).unwrap(),
        &[
            KernelInput { host: &ha, device: &a },
            KernelInput { host: &hb, device: &b },
        ],
        KernelOutput { device: &out, host: &mut hout },
    )
    .unwrap_err();
    assert!(matches!(err, HarnessError::AccessViolation(_)));
}

#[test]
fn scalar_in_input_slot_fails_dispatch() {
    let n = 8;
    let bytes = n * 4;
    let mut ctx = open(EmulatedBackend::new());
    let queue = ctx.create_queue().unwrap();
    let b = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let out = ctx.allocate_device(AccessMode::WriteOnly, bytes).unwrap();
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, "sum").unwrap();
    kernel.bind_scalar(0, KernelArg::Uint(7)).unwrap();
    kernel.bind_buffer(1, &b).unwrap();
    kernel.bind_buffer(2, &out).unwrap();

    let hb = ramp(n, 1.0);
    let mut hout = HostBuffer::allocate(n).unwrap();
    let err = KernelPipeline::run(
        &mut ctx,
        &queue,
        &kernel,
        ProblemDomain::new(n).unwrap(),
        &[KernelInput { host: &hb, device: &b }],
        KernelOutput { device: &out, host: &mut hout },
    )
    .unwrap_err();
    match err {
        HarnessError::DispatchFailure { step, reason } => {
            assert_eq!(step, "dispatch");
            assert!(reason.contains("CL_INVALID_ARG_VALUE"), "{reason}");
        }
        other => panic!("expected DispatchFailure, got {other:?}"),
    }
    ctx.shutdown().unwrap();
}

#[test]
fn pipeline_rejects_bound_buffer_that_is_not_uploaded() {
    let n = 8;
    let bytes = n * 4;
    let mut ctx = open(EmulatedBackend::new());
    let queue = ctx.create_queue().unwrap();
    let a = ctx.allocate_device(AccessMode::WriteOnly, bytes).unwrap();
    let b = ctx.allocate_device(AccessMode::ReadOnly, bytes).unwrap();
    let out = ctx.allocate_device(AccessMode::WriteOnly, bytes).unwrap();
    let program = ctx.build_program(SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    let mut kernel = ctx.create_kernel(&program, "sum").unwrap();
    kernel.bind_buffer(0, &a).unwrap();
    kernel.bind_buffer(1, &b).unwrap();
    kernel.bind_buffer(2, &out).unwrap();

    let hb = ramp(n, 1.0);
    let mut hout = HostBuffer::allocate(n).unwrap();
    let err = KernelPipeline::run(
        &mut ctx,
        &queue,
        &kernel,
        ProblemDomain::new(n).unwrap(),
        &[KernelInput { host: &hb, device: &b }],
        KernelOutput { device: &out, host: &mut hout },
    )
    .unwrap_err();
    assert!(
        matches!(err, HarnessError::AccessViolation(ref m) if m.contains("neither an input nor the output")),
        "got {err:?}"
    );
}

#[test]
fn emulated_dispatch_refuses_write_only_input() {
    let mut backend = EmulatedBackend::new();
    let platform = backend.platforms().unwrap().remove(0);
    let context = backend.create_context(platform.id, platform.devices[0].id).unwrap();
    let queue = backend.create_queue(context).unwrap();
    let a = backend.create_buffer(context, AccessMode::WriteOnly, 32).unwrap();
    let b = backend.create_buffer(context, AccessMode::ReadOnly, 32).unwrap();
    let out = backend.create_buffer(context, AccessMode::WriteOnly, 32).unwrap();
    let (program, report) = backend.build_program(context, SUM_CL, DEFAULT_BUILD_OPTIONS).unwrap();
    assert!(report.status.is_success());
    let kernel = backend.create_kernel(program, "sum").unwrap();
    backend.set_kernel_arg(kernel, 0, KernelArg::Buffer(a)).unwrap();
    backend.set_kernel_arg(kernel, 1, KernelArg::Buffer(b)).unwrap();
    backend.set_kernel_arg(kernel, 2, KernelArg::Buffer(out)).unwrap();

    let err = backend.enqueue_dispatch(queue, kernel, 8).unwrap_err();
    match err {
        HarnessError::Api { operation, message } => {
            assert_eq!(operation, "enqueue_dispatch");
            assert!(message.contains("CL_INVALID_ARG_VALUE"), "{message}");
            assert!(message.contains("write-only"), "{message}");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[test]
fn empty_domain_rejected() {
    assert!(matches!(
        ProblemDomain::new(0),
        Err(HarnessError::InvalidConfig(_))
    ));
}

#[test]
fn injected_faults_name_the_failing_step() {
    let cases = [
        (FaultPoint::Write, PipelineStep::Upload),
        (FaultPoint::Dispatch, PipelineStep::Dispatch),
        (FaultPoint::Read, PipelineStep::Readback),
        (FaultPoint::Finish, PipelineStep::AwaitUpload),
    ];
    for (fault, step) in cases {
        let backend = EmulatedBackend::builder()
            .device("gpusum", "Faulty GPU", "OpenCL 1.2", DeviceClass::Gpu)
            .fail_at(fault)
            .build();
        let journal = backend.journal();
        let n = 64;
        let mut ctx = open(backend);
        let bound = bind_sum(&mut ctx, n);
        let a = ramp(n, 1.0);
        let b = ramp(n, 1.0);
        let mut out = HostBuffer::allocate(n).unwrap();

        let err = run_sum(&mut ctx, &bound, &a, &b, &mut out).unwrap_err();
        match err {
            HarnessError::DispatchFailure { step: got, reason } => {
                assert_eq!(got, step.name(), "fault {fault:?}");
                assert!(reason.contains("CL_OUT_OF_RESOURCES"));
            }
            other => panic!("expected DispatchFailure for {fault:?}, got {other:?}"),
        }
        ctx.shutdown().unwrap();
        assert_eq!(journal.live(), 0);
    }
}

#[test]
fn pipeline_step_names() {
    let names: Vec<_> = [
        PipelineStep::Upload,
        PipelineStep::AwaitUpload,
        PipelineStep::Dispatch,
        PipelineStep::AwaitDispatch,
        PipelineStep::Readback,
        PipelineStep::AwaitReadback,
    ]
    .iter()
    .map(|s| s.name())
    .collect();
    assert_eq!(
        names,
        ["upload", "await_upload", "dispatch", "await_dispatch", "readback", "await_readback"]
    );
}

// ─── Hardware Tests ──────────────────────────────────────────

#[cfg(feature = "opencl")]
#[test]
#[ignore = "requires an OpenCL GPU"]
fn opencl_pipeline_on_hardware() {
    let mut backend: Box<dyn ComputeBackend> = Box::new(gpusum_gpu::OpenClBackend::new());
    let device = DeviceResolver::default().resolve(backend.as_mut()).unwrap();
    let mut ctx = ComputeContext::create(backend, device).unwrap();
    let n = 4096;
    let bound = bind_sum(&mut ctx, n);
    let a = ramp(n, 1.0);
    let b = ramp(n, 0.5);
    let mut out = HostBuffer::allocate(n).unwrap();
    run_sum(&mut ctx, &bound, &a, &b, &mut out).unwrap();
    let expected = naive(a.as_slice(), b.as_slice());
    for (got, want) in out.as_slice().iter().zip(&expected) {
        assert!((got - want).abs() < 1e-4);
    }
    ctx.shutdown().unwrap();
}
