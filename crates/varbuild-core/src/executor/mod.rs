//! Build and run executors
//!
//! The toolchain is reached only through the [`Toolchain`] trait; the default
//! [`ShellToolchain`] runs configured commands with `bash -c`. Every
//! subprocess wait is async and honors both a timeout and cancellation.

use crate::error::BuildError;
use crate::types::VariantId;
use std::io;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

pub mod build;
pub mod run;

pub use build::{BuildArtifact, Builder};
pub use run::{RunResult, Runner};

/// One toolchain command for one variant
#[derive(Debug, Clone, Copy)]
pub struct ToolInvocation<'a> {
    /// Variant being built
    pub variant_id: VariantId,
    /// Shell command text
    pub command: &'a str,
    /// Directory the command runs in
    pub work_dir: &'a Path,
    /// Extra environment
    pub env: &'a [(String, String)],
    /// Wall-clock limit
    pub timeout: Option<Duration>,
}

/// Verdict of a toolchain command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainOutput {
    /// Whether the command succeeded
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub diagnostics: String,
}

/// External build system invoked per variant
///
/// Implement this trait to drive something other than a shell.
#[async_trait::async_trait]
pub trait Toolchain: Send + Sync {
    /// Run one command to completion
    ///
    /// # Errors
    /// `BuildError::Io` if the command cannot be started,
    /// `BuildError::Timeout` or `BuildError::Cancelled` if interrupted
    async fn invoke(
        &self,
        invocation: ToolInvocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ToolchainOutput, BuildError>;
}

/// Runs commands through `bash -c`
#[derive(Debug, Clone, Default)]
pub struct ShellToolchain;

#[async_trait::async_trait]
impl Toolchain for ShellToolchain {
    async fn invoke(
        &self,
        invocation: ToolInvocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ToolchainOutput, BuildError> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(invocation.command)
            .current_dir(invocation.work_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut cmd);
        let child = cmd.spawn()?;

        match wait_child(child, invocation.timeout, cancel).await? {
            Waited::Exited(output) => {
                let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
                diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(ToolchainOutput {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    diagnostics,
                })
            }
            Waited::TimedOut(limit) => Err(BuildError::Timeout(limit)),
            Waited::Cancelled => Err(BuildError::Cancelled),
        }
    }
}

/// How a child wait ended
#[derive(Debug)]
pub(crate) enum Waited {
    Exited(Output),
    TimedOut(Duration),
    Cancelled,
}

/// Grace period for reaping a killed process group
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Put the command in its own process group and kill it when dropped
///
/// Everything the command starts shares the group, so [`wait_child`] can
/// terminate the whole tree.
pub(crate) fn isolate(cmd: &mut Command) {
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
}

/// Wait for `child` to exit, killing its process group on timeout or
/// cancellation
///
/// The child must be spawned from a command passed through [`isolate`].
pub(crate) async fn wait_child(
    child: Child,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> io::Result<Waited> {
    let group = child.id();
    let output = child.wait_with_output();
    tokio::pin!(output);
    let expiry = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending::<Duration>().await,
        }
    };

    let interrupted = tokio::select! {
        biased;
        () = cancel.cancelled() => Waited::Cancelled,
        limit = expiry => Waited::TimedOut(limit),
        result = &mut output => return result.map(Waited::Exited),
    };

    if let Some(pid) = group {
        kill_group(pid);
    }
    // Reap the leader; on expiry the drop falls back to kill_on_drop.
    let _ = tokio::time::timeout(REAP_GRACE, output).await;
    Ok(interrupted)
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
