//! Process-wide `tracing` subscriber setup.
//!
//! Directive resolution order: explicit directive, then `GPUSUM_LOG`, then
//! `RUST_LOG`, then `info`. Output goes to stderr so console results on
//! stdout stay clean.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use gpusum_types::{HarnessError, HarnessResult};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "GPUSUM_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown log format '{other}' (expected pretty, compact, or json)"
            ))),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `gpusum_gpu=debug,info`. Overrides the environment.
    pub directive: Option<String>,
    pub format: LogFormat,
    /// Colored output. Ignored for JSON.
    pub ansi: bool,
}

impl LoggingConfig {
    /// The directive that will be used, after consulting the environment.
    pub fn resolved_directive(&self) -> String {
        choose_directive(
            self.directive.as_deref(),
            env::var(LOG_ENV).ok().as_deref(),
            env::var("RUST_LOG").ok().as_deref(),
        )
    }
}

/// First non-blank candidate, falling back to `info`.
pub fn choose_directive(explicit: Option<&str>, gpusum_log: Option<&str>, rust_log: Option<&str>) -> String {
    [explicit, gpusum_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE)
        .to_string()
}

/// Installs the global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed; an invalid
/// directive is `InvalidConfig`.
pub fn init_tracing(config: &LoggingConfig) -> HarnessResult<bool> {
    let directive = config.resolved_directive();
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| HarnessError::InvalidConfig(format!("invalid log directive '{directive}': {e}")))?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .pretty()
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .compact()
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr),
        ),
        LogFormat::Json => Box::new(fmt::layer().json().with_writer(std::io::stderr)),
    };

    Ok(Registry::default().with(layer).with(filter).try_init().is_ok())
}
