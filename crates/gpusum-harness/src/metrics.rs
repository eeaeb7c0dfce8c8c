//! Run metrics: data collected during one harness run.

use serde::{Deserialize, Serialize};

use gpusum_types::{HarnessError, HarnessResult};

/// Metrics collected from a harness run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Back-end name.
    pub backend: String,
    /// Selected device name.
    pub device: String,
    /// Elements per buffer.
    pub problem_size: usize,
    /// Host-to-device transfer time (seconds).
    pub upload_time: f64,
    /// Kernel execution time (seconds).
    pub dispatch_time: f64,
    /// Device-to-host transfer time (seconds).
    pub readback_time: f64,
    /// Host reference computation time (seconds).
    pub reference_time: f64,
    /// Whole run including setup and teardown (seconds).
    pub total_wall_time: f64,
    pub bytes_uploaded: usize,
    pub bytes_downloaded: usize,
    /// Whether the device output matched the reference.
    pub matched: bool,
    /// First index outside tolerance, if any.
    pub first_mismatch: Option<usize>,
}

impl RunMetrics {
    /// CSV header line.
    pub fn to_csv_header() -> String {
        "backend,device,problem_size,upload_ms,dispatch_ms,readback_ms,reference_ms,total_wall_time_s,bytes_uploaded,bytes_downloaded,matched,first_mismatch".to_string()
    }

    /// Format this metrics instance as a CSV data row.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{:.4},{:.4},{:.4},{:.4},{:.6},{},{},{},{}",
            csv_field(&self.backend),
            csv_field(&self.device),
            self.problem_size,
            self.upload_time * 1000.0,
            self.dispatch_time * 1000.0,
            self.readback_time * 1000.0,
            self.reference_time * 1000.0,
            self.total_wall_time,
            self.bytes_uploaded,
            self.bytes_downloaded,
            self.matched,
            self.first_mismatch.map(|i| i.to_string()).unwrap_or_default(),
        )
    }

    /// Format multiple metrics as a complete CSV string.
    pub fn to_csv(metrics: &[RunMetrics]) -> String {
        let mut csv = Self::to_csv_header();
        for m in metrics {
            csv.push('\n');
            csv.push_str(&m.to_csv_row());
        }
        csv
    }

    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::Serialization(e.to_string()))
    }
}

/// Quotes a field that contains a separator or a quote.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
