//! Usage statistics (opt-in).
//!
//! Samples are aggregated per engine and per command in memory and appended
//! to a JSONL file as one line per batch. No file names, finding contents or
//! tokens are recorded; connected engines appear under their connection id.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lintbridge_core::EngineKind;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::config::TelemetryConfig;

#[derive(Debug, Default, Serialize)]
struct Timing {
    count: u64,
    total_ms: u64,
    max_ms: u64,
}

impl Timing {
    fn add(&mut self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.count += 1;
        self.total_ms = self.total_ms.saturating_add(ms);
        self.max_ms = self.max_ms.max(ms);
    }
}

#[derive(Debug, Default, Serialize)]
struct AnalysisStats {
    #[serde(flatten)]
    timing: Timing,
    findings: u64,
}

/// One batch of samples, written as a single JSONL record.
#[derive(Debug, Default, Serialize)]
struct Usage {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    analyses: BTreeMap<String, AnalysisStats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    engine_starts: BTreeMap<String, Timing>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    commands: BTreeMap<String, Timing>,
    #[serde(skip)]
    samples: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    timestamp: u128,
    #[serde(flatten)]
    usage: &'a Usage,
}

struct Batch {
    path: PathBuf,
    flush_every: usize,
    usage: Usage,
}

impl Batch {
    fn write(&mut self) {
        if self.usage.samples == 0 {
            return;
        }
        let usage = std::mem::take(&mut self.usage);
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create telemetry directory {}: {err}", parent.display());
                return;
            }
        }
        let report = Report {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            usage: &usage,
        };
        let line = match serde_json::to_string(&report) {
            Ok(line) => line,
            Err(err) => {
                warn!("Failed to encode telemetry batch: {err}");
                return;
            }
        };
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = appended {
            warn!("Failed to write telemetry to {}: {err}", self.path.display());
        }
    }
}

#[derive(Default)]
pub struct TelemetryCollector {
    batch: Mutex<Option<Batch>>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one analysis run and the number of findings it produced.
    pub fn record_analysis(
        &self,
        config: &TelemetryConfig,
        engine: &EngineKind,
        findings: usize,
        duration: Duration,
    ) {
        self.sample(config, |usage| {
            let stats = usage.analyses.entry(engine.to_string()).or_default();
            stats.timing.add(duration);
            stats.findings = stats
                .findings
                .saturating_add(u64::try_from(findings).unwrap_or(u64::MAX));
        });
    }

    pub fn record_engine_start(
        &self,
        config: &TelemetryConfig,
        engine: &EngineKind,
        duration: Duration,
    ) {
        self.sample(config, |usage| {
            usage
                .engine_starts
                .entry(engine.to_string())
                .or_default()
                .add(duration);
        });
    }

    pub fn record_command(&self, config: &TelemetryConfig, command: &str, duration: Duration) {
        self.sample(config, |usage| {
            usage.commands.entry(command.to_string()).or_default().add(duration);
        });
    }

    pub fn flush(&self) {
        if let Some(batch) = self.batch.lock().as_mut() {
            batch.write();
        }
    }

    fn sample(&self, config: &TelemetryConfig, apply: impl FnOnce(&mut Usage)) {
        let mut guard = self.batch.lock();
        let path = match (&config.path, config.enabled) {
            (Some(path), true) => path,
            _ => {
                // Turning telemetry off keeps what was already collected.
                if let Some(mut batch) = guard.take() {
                    batch.write();
                }
                return;
            }
        };
        let flush_every = config.flush_every.max(1);
        let stale = guard
            .as_ref()
            .is_some_and(|batch| &batch.path != path || batch.flush_every != flush_every);
        if stale {
            if let Some(mut batch) = guard.take() {
                batch.write();
            }
        }
        let batch = guard.get_or_insert_with(|| Batch {
            path: path.clone(),
            flush_every,
            usage: Usage::default(),
        });
        apply(&mut batch.usage);
        batch.usage.samples += 1;
        if batch.usage.samples >= batch.flush_every {
            batch.write();
        }
    }
}
