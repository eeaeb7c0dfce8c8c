//! Integration tests for gpusum-harness.

use std::path::PathBuf;

use gpusum_gpu::{ComputeBackend, EmulatedBackend, FaultPoint, SelectionPolicy};
use gpusum_harness::{BackendKind, HarnessConfig, HarnessRunner, RunMetrics};
use gpusum_telemetry::{EventBus, EventKind, VecSink};
use gpusum_types::{BuildStatus, DeviceClass, HarnessError};

fn kernel_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kernels/sum.cl")
}

fn small_config(n: usize) -> HarnessConfig {
    HarnessConfig {
        problem_size: n,
        kernel_path: kernel_path(),
        ..Default::default()
    }
}

fn emulated() -> Box<dyn ComputeBackend> {
    Box::new(EmulatedBackend::new())
}

// ─── Config Tests ────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = HarnessConfig::default();
    assert_eq!(config.problem_size, 16 * 1024 * 1024);
    assert_eq!(config.epsilon, 5e-5);
    assert_eq!(config.entry_point, "sum");
    assert_eq!(config.build_options, "-Werror -cl-mad-enable -cl-fast-relaxed-math");
    assert_eq!(config.selection, SelectionPolicy::LastGpu);
    assert_eq!(config.backend, BackendKind::Emulated);
    assert!(config.validate().is_ok());
}

#[test]
fn config_toml_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.toml");
    std::fs::write(
        &path,
        "problem_size = 1024\nselection = \"first_gpu\"\nseed = 42\n",
    )
    .unwrap();

    let config = HarnessConfig::from_toml_file(&path).unwrap();
    assert_eq!(config.problem_size, 1024);
    assert_eq!(config.selection, SelectionPolicy::FirstGpu);
    assert_eq!(config.seed, 42);
    assert_eq!(config.epsilon, 5e-5);
}

#[test]
fn config_toml_roundtrip() {
    let config = HarnessConfig::quick();
    let text = config.to_toml_string().unwrap();
    let back = HarnessConfig::from_toml_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn config_rejects_unknown_fields() {
    let err = HarnessConfig::from_toml_str("problem_sise = 4\n").unwrap_err();
    assert!(matches!(err, HarnessError::Serialization(_)));
}

#[test]
fn config_missing_file_is_io_error() {
    let err = HarnessConfig::from_toml_file("/nonexistent/harness.toml").unwrap_err();
    assert!(matches!(err, HarnessError::Io(_)));
}

#[test]
fn config_validation() {
    let bad = [
        HarnessConfig { problem_size: 0, ..Default::default() },
        HarnessConfig { epsilon: 0.0, ..Default::default() },
        HarnessConfig { epsilon: f32::NAN, ..Default::default() },
        HarnessConfig { input_max: -1.0, ..Default::default() },
        HarnessConfig { entry_point: " ".into(), ..Default::default() },
    ];
    for config in bad {
        assert!(
            matches!(config.validate(), Err(HarnessError::InvalidConfig(_))),
            "{config:?}"
        );
    }
}

#[test]
fn backend_kind_parsing() {
    assert_eq!("emulated".parse::<BackendKind>().unwrap(), BackendKind::Emulated);
    assert_eq!("OpenCL".parse::<BackendKind>().unwrap(), BackendKind::Opencl);
    assert!("cuda".parse::<BackendKind>().is_err());
}

#[cfg(not(feature = "opencl"))]
#[test]
fn opencl_backend_requires_feature() {
    assert!(matches!(
        BackendKind::Opencl.create(),
        Err(HarnessError::InvalidConfig(_))
    ));
}

// ─── Runner Tests ────────────────────────────────────────────

#[test]
fn run_matches_reference() {
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(sink));

    let report = HarnessRunner::run(&small_config(10_000), emulated(), &mut bus).unwrap();
    assert!(report.comparison.is_match(), "{}", report.comparison);
    assert_eq!(report.device.name, "Emulated GPU");
    assert_eq!(report.inventory.platform_count(), 1);
    assert!(report.build_log.is_empty());

    let m = &report.metrics;
    assert_eq!(m.backend, "emulated");
    assert_eq!(m.problem_size, 10_000);
    assert_eq!(m.bytes_uploaded, 80_000);
    assert_eq!(m.bytes_downloaded, 40_000);
    assert!(m.matched);
    assert_eq!(m.first_mismatch, None);

    let names = log.names();
    assert_eq!(names.first(), Some(&"inventory"));
    assert!(names.contains(&"build_finished"));
    assert_eq!(names.iter().filter(|n| **n == "pipeline_step").count(), 3);
    assert!(names.contains(&"validation_finished"));
    assert_eq!(names.last(), Some(&"resource_released"));
}

#[test]
fn run_single_element() {
    let mut bus = EventBus::disabled();
    let report = HarnessRunner::run(&small_config(1), emulated(), &mut bus).unwrap();
    assert!(report.comparison.is_match());
}

#[test]
fn run_releases_everything() {
    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    let mut bus = EventBus::disabled();
    HarnessRunner::run(&small_config(256), Box::new(backend), &mut bus).unwrap();
    assert_eq!(journal.live(), 0);
}

#[test]
fn run_reports_what_teardown_released() {
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(sink));
    HarnessRunner::run(&small_config(64), emulated(), &mut bus).unwrap();

    let released: Vec<(String, usize)> = log
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::ResourceReleased { resource, count } => Some((resource, count)),
            _ => None,
        })
        .collect();
    let expected = [
        ("kernel", 1),
        ("program", 1),
        ("device buffer", 3),
        ("command queue", 1),
        ("context", 1),
        ("host buffer", 3),
    ];
    assert_eq!(
        released,
        expected.map(|(r, c)| (r.to_string(), c)).to_vec()
    );
}

#[test]
fn full_size_default_run_matches_within_tolerance() {
    let config = HarnessConfig {
        kernel_path: kernel_path(),
        ..Default::default()
    };
    assert_eq!(config.problem_size, 16 * 1024 * 1024);
    assert_eq!(config.epsilon, 5e-5);

    let mut bus = EventBus::disabled();
    let report = HarnessRunner::run(&config, emulated(), &mut bus).unwrap();
    assert!(report.comparison.is_match(), "{}", report.comparison);
    assert_eq!(report.metrics.bytes_uploaded, 2 * 16 * 1024 * 1024 * 4);
}

#[test]
fn run_without_gpu_fails_with_device_not_found() {
    let backend = EmulatedBackend::builder()
        .platform("Vendor", "CPU platform", "OpenCL 1.2")
        .device("Vendor", "Host CPU", "OpenCL 1.2", DeviceClass::Cpu)
        .build();
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(sink));

    let err = HarnessRunner::run(&small_config(16), Box::new(backend), &mut bus).unwrap_err();
    assert!(matches!(err, HarnessError::DeviceNotFound { platforms: 1 }));
    assert_eq!(log.names(), vec!["inventory"]);
}

#[test]
fn run_with_broken_kernel_reports_build_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.cl");
    std::fs::write(&path, "__kernel void sum(__global float* a,\n  __global float* b,\n  __global float* out {\n}\n").unwrap();

    let backend = EmulatedBackend::new();
    let journal = backend.journal();
    let config = HarnessConfig {
        kernel_path: path,
        ..small_config(64)
    };
    let mut bus = EventBus::disabled();
    let err = HarnessRunner::run(&config, Box::new(backend), &mut bus).unwrap_err();
    match err {
        HarnessError::BuildFailure { status, log } => {
            assert_eq!(status, BuildStatus::Error);
            assert!(log.contains("error:"), "{log}");
        }
        other => panic!("expected BuildFailure, got {other:?}"),
    }
    assert_eq!(journal.live(), 0);
}

#[test]
fn run_with_missing_kernel_file() {
    let config = HarnessConfig {
        kernel_path: PathBuf::from("/nonexistent/sum.cl"),
        ..small_config(64)
    };
    let err = HarnessRunner::run(&config, emulated(), &mut EventBus::disabled()).unwrap_err();
    assert!(matches!(err, HarnessError::Io(_)));
}

#[test]
fn run_dispatch_fault_is_reported() {
    let backend = EmulatedBackend::builder()
        .device("gpusum", "Faulty GPU", "OpenCL 1.2", DeviceClass::Gpu)
        .fail_at(FaultPoint::Read)
        .build();
    let journal = backend.journal();
    let err = HarnessRunner::run(&small_config(64), Box::new(backend), &mut EventBus::disabled())
        .unwrap_err();
    assert!(matches!(err, HarnessError::DispatchFailure { ref step, .. } if step == "readback"));
    assert_eq!(journal.live(), 0);
}

#[test]
fn run_with_device_memory_too_small() {
    let backend = EmulatedBackend::builder()
        .device("gpusum", "Tiny GPU", "OpenCL 1.2", DeviceClass::Gpu)
        .device_memory(1024)
        .build();
    let err = HarnessRunner::run(&small_config(1024), Box::new(backend), &mut EventBus::disabled())
        .unwrap_err();
    assert!(matches!(err, HarnessError::AllocationFailure(_)));
}

#[test]
fn run_rejects_invalid_config() {
    let config = HarnessConfig {
        problem_size: 0,
        ..small_config(1)
    };
    let err = HarnessRunner::run(&config, emulated(), &mut EventBus::disabled()).unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfig(_)));
}

#[test]
fn tight_epsilon_reports_mismatch_not_error() {
    let config = HarnessConfig {
        epsilon: f32::MIN_POSITIVE,
        ..small_config(4096)
    };
    let report = HarnessRunner::run(&config, emulated(), &mut EventBus::disabled()).unwrap();
    // Fused accumulation and reciprocal scaling differ from the host in the
    // last bits for at least some element.
    assert!(!report.comparison.is_match());
    assert!(!report.metrics.matched);
    assert!(report.metrics.first_mismatch.is_some());
}

#[test]
fn inventory_and_selection() {
    let mut backend = EmulatedBackend::builder()
        .platform("A", "First", "1.2")
        .device("A", "GPU 1", "1.2", DeviceClass::Gpu)
        .platform("B", "Second", "3.0")
        .device("B", "GPU 2", "3.0", DeviceClass::Gpu)
        .build();
    let survey = HarnessRunner::inventory(&mut backend, SelectionPolicy::LastGpu).unwrap();
    assert_eq!(survey.inventory.device_count(), 2);
    assert_eq!(survey.selected.unwrap().name, "GPU 2");

    let survey = HarnessRunner::inventory(&mut backend, SelectionPolicy::FirstGpu).unwrap();
    assert_eq!(survey.selected.unwrap().name, "GPU 1");

    let mut empty = EmulatedBackend::builder().build();
    let survey = HarnessRunner::inventory(&mut empty, SelectionPolicy::LastGpu).unwrap();
    assert!(survey.selected.is_none());
}

#[test]
fn build_only_returns_log() {
    let log = HarnessRunner::build_only(&small_config(1), emulated(), &mut EventBus::disabled()).unwrap();
    assert!(log.is_empty());

    let config = HarnessConfig {
        entry_point: "missing".into(),
        ..small_config(1)
    };
    let err = HarnessRunner::build_only(&config, emulated(), &mut EventBus::disabled()).unwrap_err();
    assert!(matches!(err, HarnessError::Api { .. }));
}

// ─── Metrics Tests ───────────────────────────────────────────

fn sample_metrics() -> RunMetrics {
    RunMetrics {
        backend: "emulated".into(),
        device: "Emulated GPU".into(),
        problem_size: 1024,
        upload_time: 0.001,
        dispatch_time: 0.002,
        readback_time: 0.0005,
        reference_time: 0.01,
        total_wall_time: 0.02,
        bytes_uploaded: 8192,
        bytes_downloaded: 4096,
        matched: false,
        first_mismatch: Some(7),
    }
}

#[test]
fn metrics_csv() {
    let m = sample_metrics();
    let header_cols = RunMetrics::to_csv_header().split(',').count();
    let row = m.to_csv_row();
    assert_eq!(row.split(',').count(), header_cols);
    assert!(row.starts_with("emulated,Emulated GPU,1024,1.0000,2.0000,0.5000,"));
    assert!(row.ends_with(",8192,4096,false,7"));

    let csv = RunMetrics::to_csv(&[m.clone(), m]);
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn metrics_csv_quotes_separators() {
    let m = RunMetrics {
        device: "GPU, rev \"B\"".into(),
        first_mismatch: None,
        ..sample_metrics()
    };
    let row = m.to_csv_row();
    assert!(row.contains("\"GPU, rev \"\"B\"\"\""));
    assert!(row.ends_with(",false,"));
}

#[test]
fn metrics_json() {
    let m = sample_metrics();
    let json = m.to_json().unwrap();
    let back: RunMetrics = serde_json::from_str(&json).unwrap();
    assert_eq!(back, m);
}
