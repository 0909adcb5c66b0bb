//! varbuild core - parallel build-and-run engine for template variants
//!
//! Takes a parameterized source template and:
//! - Plans variants from a sweep with unique identity and device assignment
//! - Builds each variant in an isolated directory through a toolchain
//! - Runs it with `PARABUILD_ID` / `CUDA_VISIBLE_DEVICES` and a timeout
//! - Collects its output and produces a report in id order
//!
//! # Example
//!
//! ```rust,no_run
//! use varbuild_core::prelude::*;
//!
//! # async fn example() -> Result<(), EngineError> {
//! let config = EngineConfig::new()
//!     .with_template("main.cpp.template")
//!     .with_build_command("c++ $CPPFLAGS main.cpp -o main");
//! let sweep = SweepSpec::new()
//!     .with_axis("N", [1, 2, 3])
//!     .with_expectation(Expectation::new(OutputLocator::per_id(), "{{N}}"));
//!
//! let plan = Planner::new(PlanState::new(0)).plan(&sweep)?;
//! let report = Orchestrator::new(config).run(plan).await?;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod collect;
pub mod config;
pub mod devices;
pub mod error;
pub mod executor;
pub mod identity;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod state_machine;
pub mod types;
pub mod workspace;

pub use collect::{verify, Collector};
pub use config::{EngineConfig, FailurePolicy, IdentityDelivery};
pub use devices::{discover_gpu_devices, parse_gpu_listing};
pub use error::{BuildError, CollectError, EngineError, PlanError, RunError, StateMachineError};
pub use executor::{
    BuildArtifact, Builder, RunResult, Runner, ShellToolchain, ToolInvocation, Toolchain,
    ToolchainOutput,
};
pub use identity::{current_identity, resolve_identity};
pub use orchestrator::Orchestrator;
pub use planner::{Axis, Plan, PlanState, Planner, SweepSpec};
pub use report::{Outcome, Report, ReportEntry, RunFailure, Summary};
pub use state_machine::{VariantState, VariantTracker};
pub use types::{
    Bindings, BuildMode, Expectation, OutputLocator, ResourceAssignment, RunId, Variant,
    VariantId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        BuildMode, EngineConfig, EngineError, Expectation, Orchestrator, Outcome, OutputLocator,
        PlanState, Planner, Report, SweepSpec, VariantId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
