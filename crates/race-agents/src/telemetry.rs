//! Run reports: per-unit confidence outcomes plus the usage snapshot for one
//! pipeline run, appended to a JSONL log.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use triangulation::{ConfidenceLevel, ConsensusResult, ModelTier, UsageSnapshot};

use crate::config::RunMode;
use crate::engine::EngineOutcome;

/// Outcome of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub unit: String,
    pub confidence: ConfidenceLevel,
    pub contributors: usize,
    pub responses: usize,
    pub failures: usize,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub race_id: String,
    pub mode: RunMode,
    pub tier: ModelTier,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub units: Vec<UnitRecord>,
    /// Units per confidence level.
    pub confidence_counts: BTreeMap<ConfidenceLevel, usize>,
    /// Provider-level failures per provider id, summed over units.
    pub provider_failures: BTreeMap<String, usize>,
    pub timed_out_units: usize,
    pub usage: UsageSnapshot,
}

impl RunReport {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn count(&self, level: ConfidenceLevel) -> usize {
        self.confidence_counts.get(&level).copied().unwrap_or(0)
    }
}

/// Collects unit records while a run is in progress.
pub struct RunRecorder {
    run_id: String,
    race_id: String,
    mode: RunMode,
    tier: ModelTier,
    started_at: DateTime<Utc>,
    start: Instant,
    units: Vec<UnitRecord>,
    provider_failures: BTreeMap<String, usize>,
}

impl RunRecorder {
    pub fn new(run_id: &str, race_id: &str, mode: RunMode, tier: ModelTier) -> Self {
        Self {
            run_id: run_id.to_string(),
            race_id: race_id.to_string(),
            mode,
            tier,
            started_at: Utc::now(),
            start: Instant::now(),
            units: Vec::new(),
            provider_failures: BTreeMap::new(),
        }
    }

    /// Record a unit that went through fan-out and arbitration.
    pub fn record_unit(&mut self, result: &ConsensusResult, outcome: &EngineOutcome, elapsed_ms: u64) {
        for failure in &outcome.failures {
            *self
                .provider_failures
                .entry(failure.provider.to_string())
                .or_default() += 1;
        }
        self.units.push(UnitRecord {
            unit: result.unit_key.to_string(),
            confidence: result.confidence_level,
            contributors: result.contributing_providers.len(),
            responses: outcome.responses.len(),
            failures: outcome.failures.len(),
            timed_out: outcome.cancelled,
            elapsed_ms,
        });
    }

    /// Record a unit the race timeout prevented from running.
    pub fn record_skipped(&mut self, result: &ConsensusResult) {
        self.units.push(UnitRecord {
            unit: result.unit_key.to_string(),
            confidence: result.confidence_level,
            contributors: 0,
            responses: 0,
            failures: 0,
            timed_out: true,
            elapsed_ms: 0,
        });
    }

    pub fn finish(self, usage: UsageSnapshot) -> RunReport {
        let mut confidence_counts = BTreeMap::new();
        for unit in &self.units {
            *confidence_counts.entry(unit.confidence).or_default() += 1;
        }
        let timed_out_units = self.units.iter().filter(|u| u.timed_out).count();
        RunReport {
            run_id: self.run_id,
            race_id: self.race_id,
            mode: self.mode,
            tier: self.tier,
            started_at: self.started_at,
            elapsed_ms: self.start.elapsed().as_millis() as u64,
            units: self.units,
            confidence_counts,
            provider_failures: self.provider_failures,
            timed_out_units,
            usage,
        }
    }
}

/// Append a run report as one JSON line.
pub fn append_report(report: &RunReport, path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create telemetry directory: {e}");
            return;
        }
    }
    match serde_json::to_string(report) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append run report: {e}");
                    } else {
                        info!(path = %path.display(), run_id = %report.run_id, "Appended run report");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize run report: {e}"),
    }
}

/// Reads run reports back from a JSONL log.
pub struct TelemetryReader {
    reports: Vec<RunReport>,
}

impl TelemetryReader {
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        use std::fs::File;
        use std::io::{BufRead, BufReader};

        let reader = BufReader::new(File::open(path)?);
        let mut reports = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let report: RunReport = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            reports.push(report);
        }
        Ok(Self { reports })
    }

    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    /// Confidence counts summed over every report.
    pub fn confidence_totals(&self) -> BTreeMap<ConfidenceLevel, usize> {
        let mut totals = BTreeMap::new();
        for report in &self.reports {
            for (level, count) in &report.confidence_counts {
                *totals.entry(*level).or_default() += count;
            }
        }
        totals
    }
}
