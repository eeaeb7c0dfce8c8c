//! gpusum CLI: run the windowed-sum kernel and check it against the host.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use gpusum_harness::BackendKind;
use gpusum_telemetry::{init_tracing, LogFormat, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(name = "gpusum")]
#[command(version, about = "gpusum: windowed-sum GPU harness with host validation")]
struct Cli {
    /// Log filter directive (overrides GPUSUM_LOG and RUST_LOG).
    #[arg(long, global = true)]
    log: Option<String>,

    /// Log output format: pretty, compact, or json.
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kernel on the selected device and validate the result.
    Run(RunArgs),

    /// List platforms and devices and show which device would be used.
    Devices {
        /// Compute back-end.
        #[arg(long, default_value = "emulated")]
        backend: BackendKind,

        /// Prefer the first GPU found instead of the last.
        #[arg(long)]
        first_gpu: bool,
    },

    /// Build the kernel only and print the build log.
    Build {
        /// Kernel source file.
        #[arg(short, long)]
        kernel: Option<PathBuf>,

        /// Compute back-end.
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Build options (defaults to the harness options).
        #[arg(long)]
        options: Option<String>,
    },

    /// Load and validate a configuration file.
    Validate {
        /// Path to harness config (TOML).
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to harness config (TOML). Flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of elements.
    #[arg(short = 'n', long)]
    pub size: Option<usize>,

    /// Comparison tolerance.
    #[arg(short, long)]
    pub epsilon: Option<f32>,

    /// Kernel source file.
    #[arg(short, long)]
    pub kernel: Option<PathBuf>,

    /// Compute back-end: emulated or opencl.
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Seed for input generation.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Prefer the first GPU found instead of the last.
    #[arg(long)]
    pub first_gpu: bool,

    /// Append run metrics to this CSV file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write harness events to this file as JSON lines.
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Print run metrics as JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 when results don't match.
    #[arg(long)]
    pub strict: bool,
}

fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        directive: cli.log.clone(),
        format: cli.log_format,
        ansi: std::io::stderr().is_terminal(),
    };
    if let Err(e) = init_tracing(&logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run(&args),
        Commands::Devices { backend, first_gpu } => commands::devices(backend, first_gpu),
        Commands::Build {
            kernel,
            backend,
            options,
        } => commands::build(kernel, backend, options),
        Commands::Validate { path } => commands::validate(&path),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    println!("Done.");
    std::process::exit(code);
}
