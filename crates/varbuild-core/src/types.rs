//! Core types for varbuild
//!
//! Defines the fundamental types shared by every stage:
//! - Variant identity and run identity
//! - Build modes (compile-time switches)
//! - Resource assignments
//! - Output expectations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use ulid::Ulid;

pub use varbuild_template::Bindings;

/// Numeric variant identity, injected into the variant's own process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub u64);

impl VariantId {
    /// Raw numeric value
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Name of the isolated per-variant directory
    #[inline]
    #[must_use]
    pub fn dir_name(self) -> String {
        format!("variant_{}", self.0)
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Unique identifier of one engine run (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compile-time mode of a variant build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Neither switch defined
    Plain,
    /// `PARABUILD` defined: identity-aware behavior
    #[default]
    Parallel,
    /// `PROFILING` defined: profiling behavior
    Profiling,
}

impl BuildMode {
    /// Preprocessor symbol switched on by this mode
    #[inline]
    #[must_use]
    pub fn define(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Parallel => Some("PARABUILD"),
            Self::Profiling => Some("PROFILING"),
        }
    }

    /// Lowercase name, as exported to the toolchain
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Parallel => "parallel",
            Self::Profiling => "profiling",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "parallel" | "parabuild" => Ok(Self::Parallel),
            "profiling" => Ok(Self::Profiling),
            other => Err(format!("unknown build mode: {other}")),
        }
    }
}

/// Devices handed to one variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceAssignment(pub Vec<String>);

impl ResourceAssignment {
    /// Comma-separated value for the resource environment variable
    #[must_use]
    pub fn env_value(&self) -> String {
        self.0.join(",")
    }

    /// Assigned device identifiers
    #[inline]
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.0
    }
}

/// Where a variant's output is expected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLocator {
    /// `<id>.<extension>` in the working directory
    PerId {
        /// File extension, `txt` by default
        #[serde(default = "default_extension")]
        extension: String,
    },
    /// A fixed file name in the working directory
    Fixed {
        /// Path relative to the working directory
        path: PathBuf,
    },
    /// Captured standard output of the run
    Stdout,
}

fn default_extension() -> String {
    "txt".to_string()
}

impl OutputLocator {
    /// `<id>.txt`
    #[inline]
    #[must_use]
    pub fn per_id() -> Self {
        Self::PerId {
            extension: default_extension(),
        }
    }

    /// A fixed file name such as `output.txt`
    #[inline]
    #[must_use]
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self::Fixed { path: path.into() }
    }

    /// File the locator points at, `None` for stdout
    #[must_use]
    pub fn resolve(&self, id: VariantId, work_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::PerId { extension } => Some(work_dir.join(format!("{id}.{extension}"))),
            Self::Fixed { path } => Some(work_dir.join(path)),
            Self::Stdout => None,
        }
    }
}

impl Default for OutputLocator {
    fn default() -> Self {
        Self::per_id()
    }
}

/// Expected output of a variant
///
/// In a sweep, `value` is itself a template rendered with each variant's
/// bindings (e.g. `{{N}}`); in a planned variant it holds the final text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expectation {
    /// Where the output is read from
    #[serde(default)]
    pub locator: OutputLocator,
    /// Expected content
    pub value: String,
}

impl Expectation {
    /// Create an expectation
    #[inline]
    #[must_use]
    pub fn new(locator: OutputLocator, value: impl Into<String>) -> Self {
        Self {
            locator,
            value: value.into(),
        }
    }
}

/// One concrete, fully-bound instantiation of a template
///
/// Created by the planner and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique identity
    pub id: VariantId,
    /// Placeholder bindings
    pub bindings: Bindings,
    /// Assigned devices, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceAssignment>,
    /// Compile-time mode
    pub mode: BuildMode,
    /// Output check, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<Expectation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_mode_defines() {
        assert_eq!(BuildMode::Plain.define(), None);
        assert_eq!(BuildMode::Parallel.define(), Some("PARABUILD"));
        assert_eq!(BuildMode::Profiling.define(), Some("PROFILING"));
    }

    #[test]
    fn build_mode_parses_aliases() {
        assert_eq!("PARABUILD".parse::<BuildMode>(), Ok(BuildMode::Parallel));
        assert_eq!("profiling".parse::<BuildMode>(), Ok(BuildMode::Profiling));
        assert!("release".parse::<BuildMode>().is_err());
    }

    #[test]
    fn locator_resolves_per_id_and_fixed() {
        let dir = Path::new("/w");
        assert_eq!(
            OutputLocator::per_id().resolve(VariantId(3), dir),
            Some(PathBuf::from("/w/3.txt"))
        );
        assert_eq!(
            OutputLocator::fixed("output.txt").resolve(VariantId(3), dir),
            Some(PathBuf::from("/w/output.txt"))
        );
        assert_eq!(OutputLocator::Stdout.resolve(VariantId(3), dir), None);
    }

    #[test]
    fn locator_deserializes_with_default_extension() {
        let locator: OutputLocator = serde_json::from_str(r#"{"kind":"per_id"}"#).unwrap();
        assert_eq!(locator, OutputLocator::per_id());
    }

    #[test]
    fn resource_env_value_is_comma_separated() {
        let assignment = ResourceAssignment(vec!["0".into(), "2".into()]);
        assert_eq!(assignment.env_value(), "0,2");
    }
}
