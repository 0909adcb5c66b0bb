//! Loading engine configuration and sweeps from files

use pretty_assertions::assert_eq;
use std::time::Duration;
use varbuild_core::{
    EngineConfig, EngineError, FailurePolicy, OutputLocator, PlanError, PlanState, Planner,
    SweepSpec, VariantId,
};
use varbuild_test_utils::fixture;

#[test]
fn engine_toml_overrides_defaults() {
    let path = fixture("engine.toml");
    let config = EngineConfig::load(&path).unwrap();
    let base = path.parent().unwrap();

    assert_eq!(config.workers, 2);
    assert_eq!(config.run_timeout(), Duration::from_secs(5));
    assert_eq!(config.run_slots, Some(1));
    assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    assert!(config.identity.env);
    assert!(!config.identity.positional_arg);
    assert_eq!(config.workspace_root, base.join("work"));
    assert_eq!(config.template, base.join("main.sh.template"));
    assert_eq!(config.identity_env, "PARABUILD_ID");
    assert_eq!(config.resource_env, "CUDA_VISIBLE_DEVICES");
}

#[test]
fn invalid_engine_toml_is_rejected() {
    let err = EngineConfig::from_toml_str("workers = 0").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(err.is_input_error());

    let err = EngineConfig::from_toml_str("workers = \"many\"").unwrap_err();
    assert!(matches!(err, EngineError::Toml(_)));
}

#[test]
fn json_and_toml_sweeps_agree() {
    let json = SweepSpec::load(&fixture("sweep.json")).unwrap();
    let toml = SweepSpec::load(&fixture("sweep.toml")).unwrap();
    assert_eq!(json, toml);
    assert_eq!(json.variant_count(), 5);
}

#[test]
fn sweep_file_plans_points_then_product() {
    let sweep = SweepSpec::load(&fixture("sweep.json")).unwrap();
    let plan = Planner::new(PlanState::new(20)).plan(&sweep).unwrap();

    let rows: Vec<(u64, String, Option<String>)> = plan
        .variants
        .iter()
        .map(|v| {
            (
                v.id.value(),
                v.bindings["N"].clone(),
                v.bindings.get("FLAG").cloned(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            (20, "100".into(), None),
            (21, "1".into(), Some("on".into())),
            (22, "1".into(), Some("off".into())),
            (23, "2".into(), Some("on".into())),
            (24, "2".into(), Some("off".into())),
        ]
    );

    let expected: Vec<&str> = plan
        .variants
        .iter()
        .filter_map(|v| v.expectation.as_ref())
        .map(|e| e.value.as_str())
        .collect();
    assert_eq!(expected, vec!["100", "1", "1", "2", "2"]);
    assert!(plan
        .variants
        .iter()
        .all(|v| v.expectation.as_ref().unwrap().locator == OutputLocator::per_id()));
}

#[test]
fn missing_sweep_file_is_io_error() {
    let err = SweepSpec::load(&fixture("absent.json")).unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn empty_sweep_file_plans_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "{}").unwrap();

    let sweep = SweepSpec::load(&path).unwrap();
    let mut planner = Planner::new(PlanState::new(0));
    assert_eq!(planner.plan(&sweep).unwrap_err(), PlanError::EmptySweep);
    assert_eq!(planner.state().next_id(), 0);
    assert_eq!(
        planner
            .plan(&SweepSpec::new().with_point([("N", 1)]))
            .unwrap()
            .ids(),
        vec![VariantId(0)]
    );
}
