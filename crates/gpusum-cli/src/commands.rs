//! CLI command implementations.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use gpusum_gpu::SelectionPolicy;
use gpusum_harness::{BackendKind, DeviceSurvey, HarnessConfig, HarnessRunner, RunMetrics};
use gpusum_telemetry::{EventBus, EventKind, EventSink, HarnessEvent, JsonLinesSink, TracingSink};
use gpusum_types::HarnessError;

use crate::RunArgs;

type CommandResult = Result<i32, Box<dyn std::error::Error>>;

/// Exit status when the run completed but results differ under `--strict`.
const EXIT_MISMATCH: i32 = 2;

/// Run the harness once and report the comparison.
pub fn run(args: &RunArgs) -> CommandResult {
    let config = resolve_config(args)?;

    println!("gpusum");
    println!("──────");

    let mut backend = config.backend.create()?;
    let survey = HarnessRunner::inventory(backend.as_mut(), config.selection)?;
    if !print_survey(&survey) {
        return Ok(1);
    }
    println!("Problem size: {} (epsilon {:e})", config.problem_size, config.epsilon);
    println!();

    let mut bus = EventBus::new();
    bus.add_sink(Box::new(ConsoleSink));
    bus.add_sink(Box::new(TracingSink::new(tracing::Level::DEBUG)));
    if let Some(path) = &args.events {
        bus.add_sink(Box::new(JsonLinesSink::new(Box::new(File::create(path)?))));
    }

    let report = match HarnessRunner::run(&config, backend, &mut bus) {
        Ok(report) => report,
        Err(HarnessError::BuildFailure { status, log }) => {
            eprintln!("Build failed ({status}). Log:");
            eprintln!("{log}");
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };
    bus.finish();

    println!();
    if report.comparison.is_match() {
        println!("Results match!");
    } else {
        println!("Results don't match!");
        println!("  {}", report.comparison);
    }

    let m = &report.metrics;
    println!();
    println!(
        "  upload {:.3} ms | dispatch {:.3} ms | readback {:.3} ms | host {:.3} ms | total {:.3} s",
        m.upload_time * 1000.0,
        m.dispatch_time * 1000.0,
        m.readback_time * 1000.0,
        m.reference_time * 1000.0,
        m.total_wall_time,
    );

    if args.json {
        println!("{}", m.to_json()?);
    }
    if let Some(path) = &args.output {
        append_csv(path, m)?;
        println!("Metrics written to: {}", path.display());
    }

    if args.strict && !report.comparison.is_match() {
        return Ok(EXIT_MISMATCH);
    }
    Ok(0)
}

/// List platforms and devices.
pub fn devices(backend: BackendKind, first_gpu: bool) -> CommandResult {
    let mut backend = backend.create()?;
    let survey = HarnessRunner::inventory(backend.as_mut(), policy(first_gpu))?;
    if print_survey(&survey) {
        Ok(0)
    } else {
        Ok(1)
    }
}

/// Build the kernel only.
pub fn build(kernel: Option<PathBuf>, backend: Option<BackendKind>, options: Option<String>) -> CommandResult {
    let mut config = HarnessConfig::default();
    if let Some(kernel) = kernel {
        config.kernel_path = kernel;
    }
    if let Some(backend) = backend {
        config.backend = backend;
    }
    if let Some(options) = options {
        config.build_options = options;
    }

    println!("Building {} ({})", config.kernel_path.display(), config.build_options);

    let mut bus = EventBus::new();
    match HarnessRunner::build_only(&config, config.backend.create()?, &mut bus) {
        Ok(log) => {
            println!("Build succeeded.");
            if !log.trim().is_empty() {
                println!("{log}");
            }
            Ok(0)
        }
        Err(HarnessError::BuildFailure { status, log }) => {
            eprintln!("Build failed ({status}). Log:");
            eprintln!("{log}");
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

/// Validate a configuration file.
pub fn validate(path: &Path) -> CommandResult {
    println!("gpusum Validator");
    println!("────────────────");

    let config = HarnessConfig::from_toml_file(path)?;
    config.validate()?;

    println!("✓ {} is valid", path.display());
    println!("  Backend:      {}", config.backend);
    println!("  Problem size: {}", config.problem_size);
    println!("  Epsilon:      {:e}", config.epsilon);
    println!("  Kernel:       {} ({})", config.kernel_path.display(), config.entry_point);
    println!("  Selection:    {:?}", config.selection);
    Ok(0)
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(args: &RunArgs) -> Result<HarnessConfig, HarnessError> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_toml_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(size) = args.size {
        config.problem_size = size;
    }
    if let Some(epsilon) = args.epsilon {
        config.epsilon = epsilon;
    }
    if let Some(kernel) = &args.kernel {
        config.kernel_path = kernel.clone();
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.first_gpu {
        config.selection = SelectionPolicy::FirstGpu;
    }
    config.validate()?;
    Ok(config)
}

fn policy(first_gpu: bool) -> SelectionPolicy {
    if first_gpu {
        SelectionPolicy::FirstGpu
    } else {
        SelectionPolicy::LastGpu
    }
}

/// Print the inventory and the selected device. Returns whether a device
/// was found.
fn print_survey(survey: &DeviceSurvey) -> bool {
    for line in survey.inventory.lines() {
        println!("{line}");
    }
    match &survey.selected {
        Some(device) => {
            println!("Using device {device}");
            true
        }
        None => {
            println!("No appropriate device found. :(");
            false
        }
    }
}

/// Append one row, writing the header first when the file is new or empty.
fn append_csv(path: &Path, metrics: &RunMetrics) -> std::io::Result<()> {
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{}", RunMetrics::to_csv_header())?;
    }
    writeln!(file, "{}", metrics.to_csv_row())
}

/// Prints run progress as the bus flushes events.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn handle(&mut self, event: &HarnessEvent) {
        match &event.kind {
            EventKind::ContextCreated { .. } => println!("Creating context..."),
            EventKind::QueueCreated => println!("Creating command queue..."),
            EventKind::BuildFinished { status, log_lines } => {
                println!("Building program... {status} ({log_lines} log lines)")
            }
            EventKind::PipelineStep { step, seconds, bytes } => {
                println!("  {step:<9} {:>10.3} ms  {bytes:>10} bytes", seconds * 1000.0)
            }
            EventKind::ReferenceFinished { seconds } => {
                println!("  {:<9} {:>10.3} ms", "host", seconds * 1000.0)
            }
            EventKind::ResourceReleased { resource, count: 1 } => println!("Releasing {resource}..."),
            EventKind::ResourceReleased { resource, count } => println!("Releasing {count} {resource}s..."),
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "console"
    }
}
