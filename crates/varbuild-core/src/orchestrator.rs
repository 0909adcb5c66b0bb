//! Orchestrator
//!
//! Runs Build → Run → Collect for every planned variant on a bounded pool
//! and assembles the report in id order, whatever the completion order.
//!
//! Cancellation comes from three places: the external token returned by
//! [`Orchestrator::cancel_token`], the optional global deadline, and the
//! fail-fast policy. Variants that finished keep their outcome; the rest are
//! listed as omitted.

use crate::collect::Collector;
use crate::config::{EngineConfig, FailurePolicy};
use crate::error::{EngineError, RunError};
use crate::executor::{Builder, RunResult, Runner, ShellToolchain, Toolchain};
use crate::planner::Plan;
use crate::report::{Outcome, Report, ReportEntry, RunFailure};
use crate::state_machine::{VariantState, VariantTracker};
use crate::types::{RunId, Variant, VariantId};
use crate::workspace;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Drives a plan to a report
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    toolchain: Arc<dyn Toolchain>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Shared per-run context of the pipelines
struct Pipeline {
    builder: Builder,
    runner: Runner,
    collector: Collector,
    tracker: Arc<VariantTracker>,
    workers: Arc<Semaphore>,
    run_slots: Option<Arc<Semaphore>>,
    retain_workspaces: bool,
}

impl Orchestrator {
    /// Create orchestrator using the shell toolchain
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            toolchain: Arc::new(ShellToolchain),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the toolchain
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Token that cancels every run of this orchestrator
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build, run and collect every variant of `plan`
    ///
    /// Variant failures are recorded in the report; only configuration and
    /// template problems abort the run.
    ///
    /// # Errors
    /// `EngineError::Config`, `EngineError::Io` or `EngineError::Template`
    pub async fn run(&self, plan: Plan) -> Result<Report, EngineError> {
        self.config.validate()?;
        let run_id = RunId::new();
        let mut report = Report::new(run_id, Utc::now());
        if plan.is_empty() {
            return Ok(report);
        }

        let builder = Builder::load(Arc::clone(&self.config), run_id)
            .await?
            .with_toolchain(Arc::clone(&self.toolchain));
        let run_dir = builder.run_dir();
        let tracker = Arc::new(VariantTracker::new());
        for variant in &plan.variants {
            tracker.register(variant.id);
        }
        let pipeline = Arc::new(Pipeline {
            builder,
            runner: Runner::new(Arc::clone(&self.config)),
            collector: Collector,
            tracker: Arc::clone(&tracker),
            workers: Arc::new(Semaphore::new(self.config.workers)),
            run_slots: self.config.run_slots.map(|n| Arc::new(Semaphore::new(n))),
            retain_workspaces: self.config.retain_workspaces,
        });

        tracing::info!(
            %run_id,
            variants = plan.len(),
            workers = self.config.workers,
            run_slots = ?self.config.run_slots,
            "run started"
        );

        let run_cancel = self.cancel.child_token();
        let mut tasks = JoinSet::new();
        for variant in plan.variants {
            let pipeline = Arc::clone(&pipeline);
            let cancel = run_cancel.clone();
            tasks.spawn(async move { pipeline.drive(variant, cancel).await });
        }

        let deadline = self.config.deadline().map(|d| Instant::now() + d);
        let fail_fast = self.config.failure_policy == FailurePolicy::FailFast;
        let mut entries = BTreeMap::new();
        loop {
            let joined = match deadline {
                Some(at) if !run_cancel.is_cancelled() => {
                    tokio::select! {
                        () = tokio::time::sleep_until(at) => {
                            tracing::warn!(%run_id, "deadline reached, cancelling");
                            run_cancel.cancel();
                            continue;
                        }
                        joined = tasks.join_next() => joined,
                    }
                }
                _ => tasks.join_next().await,
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok(Some(entry)) => {
                    if fail_fast && !entry.outcome.is_pass() && !run_cancel.is_cancelled() {
                        tracing::warn!(
                            variant_id = %entry.id,
                            "failure with fail-fast policy, cancelling"
                        );
                        run_cancel.cancel();
                    }
                    entries.insert(entry.id, entry);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "variant pipeline aborted"),
            }
        }

        report.entries = entries.into_values().collect();
        report.omitted = tracker.unfinished();
        report.cancelled = run_cancel.is_cancelled();

        if !self.config.retain_workspaces {
            if let Err(e) = workspace::remove(&run_dir).await {
                tracing::warn!(
                    error = %e,
                    dir = %run_dir.display(),
                    "failed to remove run directory"
                );
            }
        }

        let summary = report.summary();
        tracing::info!(
            %run_id,
            passed = summary.passed,
            build_failed = summary.build_failed,
            run_failed = summary.run_failed,
            mismatched = summary.mismatched,
            omitted = summary.omitted,
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    /// Run `plan` skipping variants already recorded in `previous`
    ///
    /// The previous entries are merged into the returned report.
    ///
    /// # Errors
    /// As [`Orchestrator::run`]
    pub async fn resume(&self, plan: Plan, previous: &Report) -> Result<Report, EngineError> {
        let done = previous.recorded_ids();
        let remaining = plan.without(|id| done.contains(&id));
        tracing::info!(
            skipped = done.len(),
            remaining = remaining.len(),
            "resuming from previous report"
        );
        let mut report = self.run(remaining).await?;
        report.merge_previous(previous);
        Ok(report)
    }
}

impl Pipeline {
    /// One variant from `Planned` to a terminal state; `None` if cancelled
    async fn drive(&self, variant: Variant, cancel: CancellationToken) -> Option<ReportEntry> {
        let _worker = acquire(&self.workers, &cancel).await?;
        let entry = self.stages(&variant, &cancel).await;
        if !self.retain_workspaces {
            let dir = self.builder.work_dir(&variant);
            if let Err(e) = workspace::remove(&dir).await {
                tracing::warn!(
                    variant_id = %variant.id,
                    error = %e,
                    "failed to remove variant directory"
                );
            }
        }
        if let Some(entry) = &entry {
            tracing::info!(
                variant_id = %variant.id,
                outcome = entry.outcome.label(),
                "variant finished"
            );
        }
        entry
    }

    async fn stages(&self, variant: &Variant, cancel: &CancellationToken) -> Option<ReportEntry> {
        let id = variant.id;
        self.mark(id, VariantState::Building);
        let artifact = match self.builder.build(variant, cancel).await {
            Ok(artifact) => artifact,
            Err(e) if e.is_cancelled() => return None,
            Err(e) => {
                self.mark(id, VariantState::BuildFailed);
                return Some(ReportEntry::new(
                    variant,
                    Outcome::BuildFailed {
                        diagnostics: e.diagnostics(),
                    },
                ));
            }
        };
        self.mark(id, VariantState::Built);

        let slot = match &self.run_slots {
            Some(slots) => Some(acquire(slots, cancel).await?),
            None => None,
        };
        self.mark(id, VariantState::Running);
        let result = match self.runner.execute(&artifact, variant, cancel).await {
            Ok(result) => result,
            Err(RunError::Cancelled) => return None,
            Err(e) => return Some(self.run_failed(variant, &e, None)),
        };
        drop(slot);
        if let Err(e) = result.check() {
            return Some(self.run_failed(variant, &e, Some(&result)));
        }
        self.mark(id, VariantState::Ran);

        let outcome = self.collector.collect(variant, &result).await;
        self.mark(
            id,
            if outcome.is_pass() {
                VariantState::Passed
            } else {
                VariantState::Mismatched
            },
        );
        Some(ReportEntry::new(variant, outcome).with_run(&result))
    }

    fn run_failed(
        &self,
        variant: &Variant,
        error: &RunError,
        result: Option<&RunResult>,
    ) -> ReportEntry {
        self.mark(variant.id, VariantState::RunFailed);
        let failure = RunFailure::from_error(error).unwrap_or(RunFailure::Crashed);
        let entry = ReportEntry::new(variant, Outcome::RunFailed { failure });
        match result {
            Some(result) => entry.with_run(result),
            None => entry,
        }
    }

    fn mark(&self, id: VariantId, state: VariantState) {
        // Rejections are logged by the tracker.
        let _ = self.tracker.advance(id, state);
    }
}

async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
    }
}
