//! Call telemetry
//!
//! One `CallOutcome` per provider invocation, fanned out to append-only sinks.

use crate::config::Settings;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    /// Display name of the model's provider entry
    pub provider: String,
    /// Registry key
    pub model_key: String,
    /// Whether the call produced a result
    pub success: bool,
    /// Wall-clock seconds from dispatch (or stream) start to termination
    pub latency_seconds: f64,
    /// Sanitized error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the outcome was recorded
    pub timestamp: DateTime<Utc>,
}

impl CallOutcome {
    /// Successful call
    pub fn success(provider: &str, model_key: &str, elapsed: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            model_key: model_key.to_string(),
            success: true,
            latency_seconds: elapsed.as_secs_f64(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Failed call
    pub fn failure(provider: &str, model_key: &str, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(provider, model_key, elapsed)
        }
    }
}

/// Append-only destination for outcomes
pub trait TelemetrySink: Send + Sync {
    /// Record one outcome; must tolerate concurrent callers
    fn record(&self, outcome: &CallOutcome);
}

/// Writes outcomes as log events
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, outcome: &CallOutcome) {
        if outcome.success {
            info!(
                provider = %outcome.provider,
                model = %outcome.model_key,
                "Model call succeeded, elapsed: {:.2}s",
                outcome.latency_seconds
            );
        } else {
            error!(
                provider = %outcome.provider,
                model = %outcome.model_key,
                "Model call failed: {}, elapsed: {:.2}s",
                outcome.error.as_deref().unwrap_or("unknown error"),
                outcome.latency_seconds
            );
        }
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlFileSink {
    file: Mutex<File>,
}

impl JsonlFileSink {
    /// Open (or create) the file in append mode
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create telemetry directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open telemetry log: {:?}", path))?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl TelemetrySink for JsonlFileSink {
    fn record(&self, outcome: &CallOutcome) {
        let mut line = match serde_json::to_vec(outcome) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize call outcome: {}", e);
                return;
            }
        };
        line.push(b'\n');

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(&line) {
            warn!("Failed to write telemetry record: {}", e);
        }
    }
}

/// Keeps outcomes in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    outcomes: Mutex<Vec<CallOutcome>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn outcomes(&self) -> Vec<CallOutcome> {
        match self.outcomes.lock() {
            Ok(outcomes) => outcomes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, outcome: &CallOutcome) {
        match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes.push(outcome.clone()),
            Err(poisoned) => poisoned.into_inner().push(outcome.clone()),
        }
    }
}

/// Fan-out over the configured sinks
#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl Telemetry {
    /// Telemetry writing to the given sinks
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    /// Log sink plus the JSON-lines file when `TELEMETRY_LOG` is set
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn TelemetrySink>> = vec![Arc::new(TracingSink)];
        if let Some(path) = &settings.logging.telemetry_log {
            info!("Writing call telemetry to {:?}", path);
            sinks.push(Arc::new(JsonlFileSink::open(path)?));
        }
        Ok(Self::new(sinks))
    }

    /// Add a sink
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Record an outcome in every sink
    pub fn record(&self, outcome: CallOutcome) {
        for sink in &self.sinks {
            sink.record(&outcome);
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").field("sinks", &self.sinks.len()).finish()
    }
}
