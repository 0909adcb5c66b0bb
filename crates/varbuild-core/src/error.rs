//! Error types for varbuild
//!
//! One enum per stage:
//! - Planning failures (fatal)
//! - Build and run failures (variant-scoped, become report outcomes)
//! - Output verification failures
//! - Engine-level configuration and I/O failures

use crate::state_machine::VariantState;
use crate::types::VariantId;
use std::path::PathBuf;
use std::time::Duration;
use varbuild_template::RenderError;

/// Top-level engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Sweep could not be planned
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Template file could not be parsed
    #[error("template {path} is malformed: {source}")]
    Template {
        /// Template file
        path: PathBuf,
        /// Underlying parse error
        source: RenderError,
    },

    /// I/O failure outside a single variant
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML decoding failed
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error stems from user-supplied input rather than the host
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Plan(_) | Self::Config(_) | Self::Template { .. } | Self::Toml(_) | Self::Json(_)
        )
    }
}

/// Sweep expansion errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    /// Sweep expands to zero variants
    #[error("sweep produces no variants")]
    EmptySweep,

    /// Axis declared twice
    #[error("duplicate axis: {0}")]
    DuplicateAxis(String),

    /// Binding value is not a scalar
    #[error("invalid binding for {name}: {reason}")]
    InvalidBinding {
        /// Placeholder name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// `devices_per_variant` set to zero
    #[error("devices_per_variant must be at least 1")]
    ZeroDevicesPerVariant,

    /// Expected-value template failed for a variant
    #[error("expectation for variant {id} cannot be rendered: {source}")]
    Expectation {
        /// Variant whose expectation failed
        id: VariantId,
        /// Render failure
        source: RenderError,
    },
}

/// Variant-scoped build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Template could not be rendered with the variant's bindings
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Workspace preparation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Toolchain exited unsuccessfully
    #[error("toolchain failed for variant {variant_id} (exit {exit_code:?})")]
    ToolchainFailure {
        /// Failing variant
        variant_id: VariantId,
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Captured compiler output
        diagnostics: String,
    },

    /// Toolchain succeeded but produced no artifact
    #[error("artifact missing: {0}")]
    MissingArtifact(PathBuf),

    /// Toolchain exceeded the build timeout
    #[error("build timed out after {0:?}")]
    Timeout(Duration),

    /// Build interrupted by cancellation
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    /// Whether the build was interrupted rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text recorded as the report diagnostics
    #[must_use]
    pub fn diagnostics(&self) -> String {
        match self {
            Self::ToolchainFailure { diagnostics, .. } => diagnostics.clone(),
            other => other.to_string(),
        }
    }
}

/// Variant-scoped run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Run exceeded its wall-clock limit and was killed
    #[error("run timed out after {0:?}")]
    Timeout(Duration),

    /// Process exited with a non-zero code
    #[error("process exited with code {0}")]
    NonZeroExit(i32),

    /// Process terminated without an exit code
    #[error("process crashed")]
    Crashed,

    /// Process could not be started
    #[error("launch failed: {0}")]
    LaunchFailure(String),

    /// Run interrupted by cancellation
    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// Check if error is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the run was interrupted rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Output verification errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectError {
    /// Expected output not found or unreadable
    #[error("output missing: {0}")]
    MissingOutput(String),

    /// Output is not valid UTF-8
    #[error("output unparseable: {0}")]
    ParseFailure(String),

    /// Output differs from the expected value
    #[error("expected {expected:?}, found {actual:?}")]
    Mismatch {
        /// Expected value
        expected: String,
        /// Value read
        actual: String,
    },
}

/// Variant lifecycle errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateMachineError {
    /// Transition not in the table
    #[error("illegal transition for variant {id}: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Variant
        id: VariantId,
        /// Current state
        from: VariantState,
        /// Requested state
        to: VariantState,
    },

    /// Variant was never registered
    #[error("unknown variant {0}")]
    UnknownVariant(VariantId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::Config("workers must be positive".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.is_input_error());
    }

    #[test]
    fn io_error_is_not_input_error() {
        let err = EngineError::from(std::io::Error::other("disk"));
        assert!(!err.is_input_error());
    }

    #[test]
    fn build_error_diagnostics_prefers_toolchain_output() {
        let err = BuildError::ToolchainFailure {
            variant_id: VariantId(4),
            exit_code: Some(1),
            diagnostics: "main.cpp:3: error".to_string(),
        };
        assert_eq!(err.diagnostics(), "main.cpp:3: error");
        assert!(err.to_string().contains("variant 4"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn run_error_predicates() {
        assert!(RunError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!RunError::NonZeroExit(2).is_timeout());
        assert!(RunError::Cancelled.is_cancelled());
    }

    #[test]
    fn plan_error_wraps_render_error() {
        let err = PlanError::Expectation {
            id: VariantId(0),
            source: RenderError::UnboundPlaceholder("N".to_string()),
        };
        assert!(err.to_string().contains("variant 0"));
    }
}
