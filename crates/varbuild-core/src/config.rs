//! Engine configuration
//!
//! Loaded from TOML; every field has a default so a config file only needs
//! the entries it changes. Durations are stored as milliseconds.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default environment variable carrying the variant identity
pub const DEFAULT_IDENTITY_ENV: &str = "PARABUILD_ID";

/// Default environment variable carrying the device assignment
pub const DEFAULT_RESOURCE_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Environment variable carrying the build mode name to the toolchain
pub const MODE_ENV: &str = "VARBUILD_MODE";

/// Environment variable carrying the mode defines to the toolchain
///
/// Owned by the engine: set on every build, empty in Plain mode.
pub const CPPFLAGS_ENV: &str = "CPPFLAGS";

/// Extension stripped from the template path to find the render destination
pub const TEMPLATE_EXTENSION: &str = "template";

/// How the identity reaches the variant process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityDelivery {
    /// Export the identity environment variable
    pub env: bool,
    /// Pass the identity as first positional argument
    pub positional_arg: bool,
}

impl Default for IdentityDelivery {
    fn default() -> Self {
        Self {
            env: true,
            positional_arg: true,
        }
    }
}

/// What happens to in-flight variants after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep going; every variant gets an outcome
    #[default]
    Continue,
    /// Cancel the run at the first build or run failure
    FailFast,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent build/run/collect pipelines
    pub workers: usize,
    /// Root under which per-run variant directories are created
    pub workspace_root: PathBuf,
    /// Project copied into each variant directory
    pub project_dir: Option<PathBuf>,
    /// Template file, relative to `project_dir` when that is set
    pub template: PathBuf,
    /// Render destination inside the variant directory
    pub render_to: Option<PathBuf>,
    /// Executable produced by the build, relative to the variant directory
    pub artifact: PathBuf,
    /// Command run once before `build_command`
    pub init_command: Option<String>,
    /// Build command
    pub build_command: String,
    /// Command used instead of executing the artifact directly
    pub run_command: Option<String>,
    /// Per-command build limit in milliseconds
    pub build_timeout_ms: Option<u64>,
    /// Per-run wall-clock limit in milliseconds
    pub run_timeout_ms: u64,
    /// Global limit for the whole engine run in milliseconds
    pub deadline_ms: Option<u64>,
    /// Maximum concurrent Run steps
    pub run_slots: Option<usize>,
    /// Identity environment variable name
    pub identity_env: String,
    /// Resource environment variable name
    pub resource_env: String,
    /// Identity delivery channels
    pub identity: IdentityDelivery,
    /// Pass every binding to the compiler as `-DNAME=VALUE`
    pub define_bindings: bool,
    /// Keep variant directories after their outcome is recorded
    pub retain_workspaces: bool,
    /// Behavior after the first failure
    pub failure_policy: FailurePolicy,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `EngineError::Toml` on malformed input, `EngineError::Config` when
    /// the decoded values are inconsistent
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// Relative `workspace_root`, `project_dir` and `template` paths are
    /// resolved against the file's directory.
    ///
    /// # Errors
    /// I/O, TOML or validation failure
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.workspace_root = anchor(base, &config.workspace_root);
            match &config.project_dir {
                Some(dir) => config.project_dir = Some(anchor(base, dir)),
                None => config.template = anchor(base, &config.template),
            }
        }
        Ok(config)
    }

    /// Check invariants between fields
    ///
    /// # Errors
    /// `EngineError::Config` describing the first violation
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        if self.run_slots == Some(0) {
            return Err(EngineError::Config("run_slots must be at least 1".into()));
        }
        if self.run_timeout_ms == 0 {
            return Err(EngineError::Config("run_timeout_ms must be positive".into()));
        }
        if self.build_command.trim().is_empty() {
            return Err(EngineError::Config("build_command is empty".into()));
        }
        if self.identity_env.is_empty() || self.resource_env.is_empty() {
            return Err(EngineError::Config(
                "environment variable names must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// With workspace root
    #[inline]
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// With project directory
    #[inline]
    #[must_use]
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// With template path
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = template.into();
        self
    }

    /// With explicit render destination
    #[inline]
    #[must_use]
    pub fn with_render_to(mut self, dest: impl Into<PathBuf>) -> Self {
        self.render_to = Some(dest.into());
        self
    }

    /// With artifact path
    #[inline]
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = artifact.into();
        self
    }

    /// With init command
    #[inline]
    #[must_use]
    pub fn with_init_command(mut self, command: impl Into<String>) -> Self {
        self.init_command = Some(command.into());
        self
    }

    /// With build command
    #[inline]
    #[must_use]
    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = command.into();
        self
    }

    /// With run command
    #[inline]
    #[must_use]
    pub fn with_run_command(mut self, command: impl Into<String>) -> Self {
        self.run_command = Some(command.into());
        self
    }

    /// With build timeout
    #[inline]
    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout_ms = Some(millis(timeout));
        self
    }

    /// With run timeout
    #[inline]
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = millis(timeout);
        self
    }

    /// With global deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(millis(deadline));
        self
    }

    /// With run slot limit
    #[inline]
    #[must_use]
    pub fn with_run_slots(mut self, slots: usize) -> Self {
        self.run_slots = Some(slots);
        self
    }

    /// With identity delivery
    #[inline]
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityDelivery) -> Self {
        self.identity = identity;
        self
    }

    /// With `-DNAME=VALUE` defines for every binding
    #[inline]
    #[must_use]
    pub fn with_define_bindings(mut self, enabled: bool) -> Self {
        self.define_bindings = enabled;
        self
    }

    /// Keep variant directories after collection
    #[inline]
    #[must_use]
    pub fn with_retain_workspaces(mut self, retain: bool) -> Self {
        self.retain_workspaces = retain;
        self
    }

    /// With failure policy
    #[inline]
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run timeout as a duration
    #[inline]
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Build timeout as a duration
    #[inline]
    #[must_use]
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_ms.map(Duration::from_millis)
    }

    /// Deadline as a duration
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Host path of the template file
    #[must_use]
    pub fn template_source(&self) -> PathBuf {
        match &self.project_dir {
            Some(dir) if self.template.is_relative() => dir.join(&self.template),
            _ => self.template.clone(),
        }
    }

    /// Render destination relative to a variant directory
    ///
    /// `render_to` when set, else the template path with a trailing
    /// `.template` stripped, else the template path itself.
    #[must_use]
    pub fn render_destination(&self) -> PathBuf {
        if let Some(dest) = &self.render_to {
            return dest.clone();
        }
        let relative = self.template_relative();
        if relative.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
            relative.with_extension("")
        } else {
            relative
        }
    }

    fn template_relative(&self) -> PathBuf {
        if self.template.is_relative() {
            return self.template.clone();
        }
        if let Some(rel) = self
            .project_dir
            .as_deref()
            .and_then(|dir| self.template.strip_prefix(dir).ok())
        {
            return rel.to_path_buf();
        }
        self.template
            .file_name()
            .map_or_else(|| self.template.clone(), PathBuf::from)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            workspace_root: std::env::temp_dir().join("varbuild"),
            project_dir: None,
            template: PathBuf::from("main.cpp.template"),
            render_to: None,
            artifact: PathBuf::from("main"),
            init_command: None,
            build_command: "c++ -O2 $CPPFLAGS main.cpp -o main".to_string(),
            run_command: None,
            build_timeout_ms: None,
            run_timeout_ms: 60_000,
            deadline_ms: None,
            run_slots: None,
            identity_env: DEFAULT_IDENTITY_ENV.to_string(),
            resource_env: DEFAULT_RESOURCE_ENV.to_string(),
            identity: IdentityDelivery::default(),
            define_bindings: false,
            retain_workspaces: false,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
