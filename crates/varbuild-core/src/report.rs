//! Run report
//!
//! One entry per variant in id order. Variants interrupted by cancellation
//! have no entry and are listed in `omitted` instead.

use crate::error::{EngineError, RunError};
use crate::executor::RunResult;
use crate::types::{Bindings, BuildMode, ResourceAssignment, RunId, Variant, VariantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// Killed after exceeding the run timeout
    Timeout {
        /// Limit that was exceeded
        after_ms: u64,
    },
    /// Exited with a non-zero code
    NonZeroExit {
        /// Exit code
        code: i32,
    },
    /// Terminated by a signal
    Crashed,
    /// Could not be started
    LaunchFailure {
        /// OS error text
        message: String,
    },
}

impl RunFailure {
    /// Map a run error to a recorded failure; cancellation is never recorded
    #[must_use]
    pub fn from_error(error: &RunError) -> Option<Self> {
        match error {
            RunError::Timeout(limit) => Some(Self::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
            RunError::NonZeroExit(code) => Some(Self::NonZeroExit { code: *code }),
            RunError::Crashed => Some(Self::Crashed),
            RunError::LaunchFailure(message) => Some(Self::LaunchFailure {
                message: message.clone(),
            }),
            RunError::Cancelled => None,
        }
    }
}

/// Final verdict for one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Built, ran and produced the expected output
    Pass,
    /// Toolchain failed or produced no artifact
    BuildFailed {
        /// Toolchain output
        diagnostics: String,
    },
    /// Execution failed
    RunFailed {
        /// Failure kind
        failure: RunFailure,
    },
    /// Output missing, unreadable or different
    Mismatch {
        /// What went wrong
        detail: String,
    },
}

impl Outcome {
    /// Whether the variant passed
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Short label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::BuildFailed { .. } => "build-failed",
            Self::RunFailed { .. } => "run-failed",
            Self::Mismatch { .. } => "mismatch",
        }
    }
}

/// Report line for one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Variant identity
    pub id: VariantId,
    /// Placeholder bindings
    pub bindings: Bindings,
    /// Build mode
    pub mode: BuildMode,
    /// Devices assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceAssignment>,
    /// Verdict
    pub outcome: Outcome,
    /// Exit code, when the variant ran to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured stdout, when the variant ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured stderr, when the variant ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Run wall-clock time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ReportEntry {
    /// Entry for a variant that never produced a run result
    #[must_use]
    pub fn new(variant: &Variant, outcome: Outcome) -> Self {
        Self {
            id: variant.id,
            bindings: variant.bindings.clone(),
            mode: variant.mode,
            resource: variant.resource.clone(),
            outcome,
            exit_code: None,
            stdout: None,
            stderr: None,
            duration_ms: None,
        }
    }

    /// Attach the captured run
    #[must_use]
    pub fn with_run(mut self, run: &RunResult) -> Self {
        self.exit_code = run.exit_code;
        self.stdout = Some(run.stdout.clone());
        self.stderr = Some(run.stderr.clone());
        self.duration_ms = Some(u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Entries
    pub total: usize,
    /// Passed
    pub passed: usize,
    /// Build failures
    pub build_failed: usize,
    /// Run failures
    pub run_failed: usize,
    /// Output mismatches
    pub mismatched: usize,
    /// Variants without an entry
    pub omitted: usize,
}

/// Result of one engine run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Run identifier
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Entries in id order
    pub entries: Vec<ReportEntry>,
    /// Variants cancelled before finishing
    #[serde(default)]
    pub omitted: Vec<VariantId>,
    /// Whether the run was cancelled
    #[serde(default)]
    pub cancelled: bool,
}

impl Report {
    /// Empty report for a run
    #[must_use]
    pub fn new(run_id: RunId, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            entries: Vec::new(),
            omitted: Vec::new(),
            cancelled: false,
        }
    }

    /// Outcomes in id order
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.entries.iter().map(|entry| &entry.outcome)
    }

    /// Entry for `id`
    #[must_use]
    pub fn entry(&self, id: VariantId) -> Option<&ReportEntry> {
        self.entries
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Ids with a recorded outcome
    #[must_use]
    pub fn recorded_ids(&self) -> BTreeSet<VariantId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Whether every planned variant passed
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.cancelled && self.omitted.is_empty() && self.outcomes().all(Outcome::is_pass)
    }

    /// Outcome counts
    #[must_use]
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.entries.len(),
            omitted: self.omitted.len(),
            ..Summary::default()
        };
        for outcome in self.outcomes() {
            match outcome {
                Outcome::Pass => summary.passed += 1,
                Outcome::BuildFailed { .. } => summary.build_failed += 1,
                Outcome::RunFailed { .. } => summary.run_failed += 1,
                Outcome::Mismatch { .. } => summary.mismatched += 1,
            }
        }
        summary
    }

    /// Add entries of a previous run for ids this run did not record
    ///
    /// Used when resuming: skipped variants keep their earlier outcome.
    pub fn merge_previous(&mut self, previous: &Report) {
        let recorded = self.recorded_ids();
        self.entries.extend(
            previous
                .entries
                .iter()
                .filter(|entry| !recorded.contains(&entry.id))
                .cloned(),
        );
        self.entries.sort_by_key(|entry| entry.id);
        let merged = self.recorded_ids();
        self.omitted.retain(|id| !merged.contains(id));
    }

    /// Pretty JSON
    ///
    /// # Errors
    /// `EngineError::Json` if serialization fails
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// `EngineError::Json` on malformed input
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file
    ///
    /// # Errors
    /// I/O or decoding failure
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Write as JSON
    ///
    /// # Errors
    /// I/O or encoding failure
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Human-readable table
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run {} started {}", self.run_id, self.started_at.to_rfc3339());
        for entry in &self.entries {
            let bindings = entry
                .bindings
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = write!(
                out,
                "  #{:<4} {:<12} {:<9} {}",
                entry.id,
                entry.outcome.label(),
                entry.mode,
                bindings
            );
            match &entry.outcome {
                Outcome::Mismatch { detail } => {
                    let _ = write!(out, "  ({detail})");
                }
                Outcome::RunFailed { failure } => {
                    let _ = write!(out, "  ({failure:?})");
                }
                Outcome::BuildFailed { diagnostics } => {
                    if let Some(line) = diagnostics.lines().find(|l| !l.trim().is_empty()) {
                        let _ = write!(out, "  ({})", line.trim());
                    }
                }
                Outcome::Pass => {}
            }
            out.push('\n');
        }
        let s = self.summary();
        let _ = writeln!(
            out,
            "{} variants: {} passed, {} build failed, {} run failed, {} mismatched, {} omitted{}",
            s.total + s.omitted,
            s.passed,
            s.build_failed,
            s.run_failed,
            s.mismatched,
            s.omitted,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn entry(id: u64, outcome: Outcome) -> ReportEntry {
        let variant = Variant {
            id: VariantId(id),
            bindings: [("N".to_string(), id.to_string())].into_iter().collect(),
            resource: None,
            mode: BuildMode::Parallel,
            expectation: None,
        };
        ReportEntry::new(&variant, outcome)
    }

    fn report(entries: Vec<ReportEntry>) -> Report {
        let mut report = Report::new(RunId::new(), Utc::now());
        report.entries = entries;
        report
    }

    #[test]
    fn cancelled_run_never_passes() {
        let mut r = report(vec![entry(0, Outcome::Pass)]);
        assert!(r.passed());
        r.cancelled = true;
        assert!(!r.passed());
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut r = report(vec![
            entry(0, Outcome::Pass),
            entry(1, Outcome::BuildFailed { diagnostics: "e".into() }),
            entry(2, Outcome::RunFailed { failure: RunFailure::Crashed }),
            entry(3, Outcome::Mismatch { detail: "d".into() }),
        ]);
        r.omitted = vec![VariantId(4)];
        let s = r.summary();
        assert_eq!(
            (s.total, s.passed, s.build_failed, s.run_failed, s.mismatched, s.omitted),
            (4, 1, 1, 1, 1, 1)
        );
        assert!(r.render_text().contains("5 variants"));
    }

    #[test]
    fn merge_previous_fills_gaps_in_id_order() {
        let previous = report(vec![entry(0, Outcome::Pass), entry(2, Outcome::Pass)]);
        let mut current = report(vec![entry(1, Outcome::Mismatch { detail: "x".into() })]);
        current.omitted = vec![VariantId(2), VariantId(3)];
        current.merge_previous(&previous);
        assert_eq!(
            current.recorded_ids().into_iter().collect::<Vec<_>>(),
            vec![VariantId(0), VariantId(1), VariantId(2)]
        );
        assert_eq!(current.omitted, vec![VariantId(3)]);
        assert_eq!(current.entry(VariantId(1)).map(|e| e.outcome.label()), Some("mismatch"));
    }

    #[test]
    fn run_failure_mapping_skips_cancellation() {
        assert_eq!(
            RunFailure::from_error(&RunError::Timeout(Duration::from_millis(250))),
            Some(RunFailure::Timeout { after_ms: 250 })
        );
        assert_eq!(RunFailure::from_error(&RunError::Cancelled), None);
    }

    #[test]
    fn json_round_trip_keeps_outcomes() {
        let r = report(vec![entry(
            0,
            Outcome::RunFailed {
                failure: RunFailure::NonZeroExit { code: 2 },
            },
        )]);
        let json = r.to_json().unwrap();
        assert!(json.contains("\"status\": \"run_failed\""));
        assert!(json.contains("\"kind\": \"non_zero_exit\""));
        assert_eq!(Report::from_json(&json).unwrap(), r);
    }
}
