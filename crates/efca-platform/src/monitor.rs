//! Metrics recording and persistence
//!
//! Points are buffered in memory and appended to `metrics.jsonl` (one JSON
//! object per line) on each save. A successful save empties the buffer, so
//! memory and per-save work stay proportional to one save interval.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointError;

/// File name written under the metrics directory.
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Metrics sink used by the training loop.
pub trait Monitor: Send {
    fn log_metric(&mut self, name: &str, value: f64, step: u64);
    /// Flush buffered points to durable storage.
    fn save_metrics(&mut self) -> Result<(), CheckpointError>;
}

/// `[monitoring]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Where `metrics.jsonl` goes. Defaults to the checkpoint directory.
    pub metrics_dir: Option<PathBuf>,
    /// Recent episodes kept in memory for the web API.
    pub history: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_dir: None,
            history: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub step: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Appends metric points to a JSON-lines file.
pub struct MlopsMonitor {
    pending: Vec<MetricPoint>,
    saved: u64,
    path: PathBuf,
}

impl MlopsMonitor {
    pub fn new(metrics_dir: &Path) -> Self {
        Self {
            pending: Vec::new(),
            saved: 0,
            path: metrics_dir.join(METRICS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points logged since the last successful save.
    pub fn pending(&self) -> &[MetricPoint] {
        &self.pending
    }

    /// Points written by this monitor so far.
    pub fn saved(&self) -> u64 {
        self.saved
    }

    fn append_pending(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CheckpointError::io(&self.path, e))?;
        let mut out = BufWriter::new(file);
        for point in &self.pending {
            serde_json::to_writer(&mut out, point).map_err(CheckpointError::Encode)?;
            out.write_all(b"\n")
                .map_err(|e| CheckpointError::io(&self.path, e))?;
        }
        out.flush().map_err(|e| CheckpointError::io(&self.path, e))
    }
}

impl Monitor for MlopsMonitor {
    fn log_metric(&mut self, name: &str, value: f64, step: u64) {
        log::trace!("metric {name}={value:.4} @ {step}");
        self.pending.push(MetricPoint {
            name: name.to_string(),
            value,
            step,
            timestamp: chrono::Utc::now(),
        });
    }

    /// On failure the buffer is kept and retried on the next save.
    fn save_metrics(&mut self) -> Result<(), CheckpointError> {
        if self.pending.is_empty() {
            log::debug!("No new metric points to save");
            return Ok(());
        }
        self.append_pending()?;
        let n = self.pending.len();
        self.saved += n as u64;
        self.pending.clear();
        log::info!(
            "Appended {n} metric points to {} ({} total)",
            self.path.display(),
            self.saved
        );
        Ok(())
    }
}

/// Read every point from a metrics file written by [`MlopsMonitor`].
pub fn read_metrics(path: &Path) -> Result<Vec<MetricPoint>, CheckpointError> {
    let content = std::fs::read_to_string(path).map_err(|e| CheckpointError::io(path, e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("line {}: {e}", i + 1),
            })
        })
        .collect()
}
