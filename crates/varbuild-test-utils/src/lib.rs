//! Testing utilities for the varbuild workspace
//!
//! Shell "projects" that stand in for a compiler toolchain: the template is a
//! bash script, the build copies it to `main`, and the run executes it.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use varbuild_core::{EngineConfig, Plan, PlanState, Planner, SweepSpec};

/// Build step of a script project; fails when the rendered script mentions `FAIL`
pub const SCRIPT_BUILD: &str = "grep -q FAIL main.sh && exit 1; cp main.sh main && chmod +x main";

/// Run step of a script project
pub const SCRIPT_RUN: &str = "bash ./main";

/// Writes `{{N}}` (default 42) to `<id>.txt`
pub const WRITE_PER_ID: &str =
    "printf '%s\\n' \"{{default N 42}}\" > \"${PARABUILD_ID:-${1:-0}}.txt\"\n";

/// Writes `{{N}}` (default 42) to `output.txt`
pub const WRITE_FIXED: &str = "printf '%s\\n' \"{{default N 42}}\" > output.txt\n";

/// Sleeps `{{SECONDS}}` (default 5) seconds, then writes `done` to stdout
pub const SLEEP_THEN_PRINT: &str = "sleep {{default SECONDS 5}}\necho done\n";

/// Prints the identity and device environment
pub const ENV_ECHO: &str =
    "echo \"id=${PARABUILD_ID:-unset} devices=${CUDA_VISIBLE_DEVICES:-unset}\"\n";

/// A throwaway project holding one script template
#[derive(Debug)]
pub struct ScriptProject {
    dir: TempDir,
}

impl ScriptProject {
    /// Create a project whose template is `script`
    ///
    /// # Panics
    /// If the temporary directory cannot be written
    #[must_use]
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("main.sh.template"), script).expect("write template");
        Self { dir }
    }

    /// Project root
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Workspace root used by [`ScriptProject::config`]
    #[must_use]
    pub fn workspace_root(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    /// Engine configuration building and running the script
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_workspace_root(self.workspace_root())
            .with_template(self.dir.path().join("main.sh.template"))
            .with_build_command(SCRIPT_BUILD)
            .with_run_command(SCRIPT_RUN)
            .with_workers(4)
    }
}

/// Plan a sweep with a fresh planner starting at `base_id`
///
/// # Panics
/// If the sweep cannot be planned
#[must_use]
pub fn plan_from(base_id: u64, sweep: &SweepSpec) -> Plan {
    Planner::new(PlanState::new(base_id))
        .plan(sweep)
        .expect("sweep plans")
}

/// Fixture directory shipped with the core crate
#[must_use]
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../varbuild-core/tests/fixtures")
        .join(name)
}

/// Whether a C++ compiler is on `PATH`
#[must_use]
pub fn cxx_available() -> bool {
    Command::new("c++")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
