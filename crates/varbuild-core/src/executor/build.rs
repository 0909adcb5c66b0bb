//! Build executor
//!
//! Materializes a variant in its own directory, renders the template into
//! it and drives the toolchain.

use super::{ShellToolchain, ToolInvocation, Toolchain};
use crate::config::{EngineConfig, CPPFLAGS_ENV, MODE_ENV};
use crate::error::{BuildError, EngineError};
use crate::types::{RunId, Variant};
use crate::workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use varbuild_template::Template;

/// Output of a successful build
///
/// Owned by its variant; the directory is removed once the outcome is
/// recorded unless workspaces are retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Executable produced by the toolchain
    pub executable: PathBuf,
    /// Variant working directory
    pub work_dir: PathBuf,
    /// Toolchain output of all build steps
    pub diagnostics: String,
}

/// Builds variants of one template
pub struct Builder {
    config: Arc<EngineConfig>,
    run_id: RunId,
    workspace_root: PathBuf,
    template: Template,
    toolchain: Arc<dyn Toolchain>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("run_id", &self.run_id)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Read and parse the configured template
    ///
    /// # Errors
    /// `EngineError::Io` if the template cannot be read,
    /// `EngineError::Template` if it is malformed
    pub async fn load(config: Arc<EngineConfig>, run_id: RunId) -> Result<Self, EngineError> {
        let path = config.template_source();
        let text = tokio::fs::read_to_string(&path).await?;
        let template =
            Template::parse(text).map_err(|source| EngineError::Template { path, source })?;
        Self::with_template(config, run_id, template)
    }

    /// Create a builder around an already parsed template
    ///
    /// # Errors
    /// `EngineError::Io` if the current directory is needed and unavailable
    pub fn with_template(
        config: Arc<EngineConfig>,
        run_id: RunId,
        template: Template,
    ) -> Result<Self, EngineError> {
        let workspace_root = if config.workspace_root.is_absolute() {
            config.workspace_root.clone()
        } else {
            std::env::current_dir()?.join(&config.workspace_root)
        };
        Ok(Self {
            config,
            run_id,
            workspace_root,
            template,
            toolchain: Arc::new(ShellToolchain),
        })
    }

    /// Replace the toolchain
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Directory holding all variants of this run
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.workspace_root.join(self.run_id.to_string())
    }

    /// Working directory of a variant
    #[must_use]
    pub fn work_dir(&self, variant: &Variant) -> PathBuf {
        workspace::variant_dir(&self.workspace_root, self.run_id, variant.id)
    }

    /// Environment handed to the toolchain
    ///
    /// `CPPFLAGS` is always set, empty in Plain mode, so a value inherited
    /// from the engine's own environment never reaches the build.
    #[must_use]
    pub fn build_env(&self, variant: &Variant) -> Vec<(String, String)> {
        let mut flags: Vec<String> = variant
            .mode
            .define()
            .map(|symbol| format!("-D{symbol}=ON"))
            .into_iter()
            .collect();
        if self.config.define_bindings {
            flags.extend(
                variant
                    .bindings
                    .iter()
                    .map(|(name, value)| format!("-D{name}={value}")),
            );
        }

        vec![
            (MODE_ENV.to_string(), variant.mode.as_str().to_string()),
            (CPPFLAGS_ENV.to_string(), flags.join(" ")),
        ]
    }

    /// Materialize, render and build one variant
    ///
    /// # Errors
    /// - `BuildError::Io` when the working directory cannot be prepared
    /// - `BuildError::Render` when a bare placeholder is unbound
    /// - `BuildError::ToolchainFailure` on a failing init or build command
    /// - `BuildError::MissingArtifact` when the toolchain produced nothing
    /// - `BuildError::Timeout`, `BuildError::Cancelled` when interrupted
    pub async fn build(
        &self,
        variant: &Variant,
        cancel: &CancellationToken,
    ) -> Result<BuildArtifact, BuildError> {
        let work_dir = self.work_dir(variant);
        workspace::prepare(
            self.config.project_dir.as_deref(),
            &work_dir,
            &self.workspace_root,
        )
        .await?;

        let rendered = self.template.render(&variant.bindings)?;
        let dest = work_dir.join(self.config.render_destination());
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, rendered).await?;
        tracing::debug!(variant_id = %variant.id, dest = %dest.display(), "template rendered");

        let env = self.build_env(variant);
        let mut diagnostics = String::new();
        let steps = self
            .config
            .init_command
            .iter()
            .chain(std::iter::once(&self.config.build_command));
        for command in steps {
            self.step(variant, command, &work_dir, &env, cancel, &mut diagnostics)
                .await?;
        }

        let executable = work_dir.join(&self.config.artifact);
        if !tokio::fs::try_exists(&executable).await.unwrap_or(false) {
            return Err(BuildError::MissingArtifact(executable));
        }
        tracing::debug!(variant_id = %variant.id, "build succeeded");
        Ok(BuildArtifact {
            executable,
            work_dir,
            diagnostics,
        })
    }

    async fn step(
        &self,
        variant: &Variant,
        command: &str,
        work_dir: &Path,
        env: &[(String, String)],
        cancel: &CancellationToken,
        diagnostics: &mut String,
    ) -> Result<(), BuildError> {
        let output = self
            .toolchain
            .invoke(
                ToolInvocation {
                    variant_id: variant.id,
                    command,
                    work_dir,
                    env,
                    timeout: self.config.build_timeout(),
                },
                cancel,
            )
            .await?;
        diagnostics.push_str(&output.diagnostics);
        if output.success {
            return Ok(());
        }
        tracing::warn!(
            variant_id = %variant.id,
            exit_code = ?output.exit_code,
            "toolchain failed"
        );
        Err(BuildError::ToolchainFailure {
            variant_id: variant.id,
            exit_code: output.exit_code,
            diagnostics: std::mem::take(diagnostics),
        })
    }
}
