//! Run executor
//!
//! Launches a built variant with its identity and resource assignment and
//! enforces the wall-clock timeout. Output files are left to the collector.

use super::build::BuildArtifact;
use super::{isolate, wait_child, Waited};
use crate::config::EngineConfig;
use crate::error::RunError;
use crate::types::Variant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Completed execution of one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration
    pub duration: Duration,
    /// Directory the output file is expected in
    pub work_dir: PathBuf,
}

impl RunResult {
    /// Classify the exit status
    ///
    /// # Errors
    /// `RunError::NonZeroExit` or `RunError::Crashed`
    pub fn check(&self) -> Result<(), RunError> {
        match self.exit_code {
            Some(0) => Ok(()),
            Some(code) => Err(RunError::NonZeroExit(code)),
            None => Err(RunError::Crashed),
        }
    }
}

/// Executes built variants
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<EngineConfig>,
}

impl Runner {
    /// Create runner
    #[inline]
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Command that launches `variant`
    ///
    /// With `run_command` configured the identity becomes `$1` of the
    /// script; otherwise it is the artifact's first argument.
    #[must_use]
    pub fn command(&self, artifact: &BuildArtifact, variant: &Variant) -> Command {
        let id = variant.id.to_string();
        let positional = self.config.identity.positional_arg;

        let mut cmd = match &self.config.run_command {
            Some(script) => {
                let mut cmd = Command::new("bash");
                cmd.arg("-c").arg(script);
                if positional {
                    cmd.arg("bash").arg(&id);
                }
                cmd
            }
            None => {
                let mut cmd = Command::new(&artifact.executable);
                if positional {
                    cmd.arg(&id);
                }
                cmd
            }
        };

        if self.config.identity.env {
            cmd.env(&self.config.identity_env, &id);
        } else {
            cmd.env_remove(&self.config.identity_env);
        }
        match &variant.resource {
            Some(resource) => cmd.env(&self.config.resource_env, resource.env_value()),
            None => cmd.env_remove(&self.config.resource_env),
        };
        cmd.current_dir(&artifact.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut cmd);
        cmd
    }

    /// Launch the variant and wait for it, whatever its exit status
    ///
    /// # Errors
    /// `RunError::LaunchFailure`, `RunError::Timeout` or `RunError::Cancelled`
    pub async fn execute(
        &self,
        artifact: &BuildArtifact,
        variant: &Variant,
        cancel: &CancellationToken,
    ) -> Result<RunResult, RunError> {
        let started = Instant::now();
        let child = self
            .command(artifact, variant)
            .spawn()
            .map_err(|e| RunError::LaunchFailure(e.to_string()))?;

        let timeout = self.config.run_timeout();
        let waited = wait_child(child, Some(timeout), cancel)
            .await
            .map_err(|e| RunError::LaunchFailure(e.to_string()))?;

        match waited {
            Waited::Exited(output) => {
                let result = RunResult {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration: started.elapsed(),
                    work_dir: artifact.work_dir.clone(),
                };
                tracing::debug!(
                    variant_id = %variant.id,
                    exit_code = ?result.exit_code,
                    duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
                    "run finished"
                );
                Ok(result)
            }
            Waited::TimedOut(limit) => {
                tracing::warn!(variant_id = %variant.id, ?limit, "run timed out, killed");
                Err(RunError::Timeout(limit))
            }
            Waited::Cancelled => Err(RunError::Cancelled),
        }
    }

    /// Launch the variant and require a successful exit
    ///
    /// # Errors
    /// Everything `execute` returns, plus `RunError::NonZeroExit` and
    /// `RunError::Crashed`
    pub async fn run(
        &self,
        artifact: &BuildArtifact,
        variant: &Variant,
        cancel: &CancellationToken,
    ) -> Result<RunResult, RunError> {
        let result = self.execute(artifact, variant, cancel).await?;
        result.check()?;
        Ok(result)
    }
}
