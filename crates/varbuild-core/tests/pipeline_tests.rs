//! End-to-end pipeline tests
//!
//! Script projects stand in for a compiler so these run without a C++
//! toolchain.

use pretty_assertions::assert_eq;
use std::time::Duration;
use varbuild_core::prelude::*;
use varbuild_core::{Report, RunFailure};
use varbuild_test_utils::{
    plan_from, ScriptProject, ENV_ECHO, SLEEP_THEN_PRINT, WRITE_FIXED, WRITE_PER_ID,
};

#[tokio::test]
async fn plain_variant_writes_fixed_output() {
    let project = ScriptProject::new(WRITE_FIXED);
    let sweep = SweepSpec::new()
        .with_point([("N", 42)])
        .with_modes([BuildMode::Plain])
        .with_expectation(Expectation::new(OutputLocator::fixed("output.txt"), "42"));

    let report = Orchestrator::new(project.config())
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    assert_eq!(report.outcomes().collect::<Vec<_>>(), vec![&Outcome::Pass]);
    assert_eq!(report.entries[0].mode, BuildMode::Plain);
}

#[tokio::test]
async fn parallel_variant_writes_per_id_output() {
    let project = ScriptProject::new(WRITE_PER_ID);
    let sweep = SweepSpec::new()
        .with_point([("N", 7)])
        .with_expectation(Expectation::new(OutputLocator::per_id(), "{{N}}"));

    let report = Orchestrator::new(project.config().with_retain_workspaces(true))
        .run(plan_from(3, &sweep))
        .await
        .unwrap();

    assert!(report.passed(), "{}", report.render_text());
    assert_eq!(report.entries[0].id, VariantId(3));
    let written = project
        .workspace_root()
        .join(report.run_id.to_string())
        .join("variant_3")
        .join("3.txt");
    assert_eq!(std::fs::read_to_string(written).unwrap(), "7\n");
}

#[tokio::test]
async fn output_removed_before_collection_is_mismatch() {
    let project = ScriptProject::new(WRITE_FIXED);
    let config = project
        .config()
        .with_run_command("bash ./main && rm -f output.txt");
    let sweep = SweepSpec::new()
        .with_point([("N", 42)])
        .with_expectation(Expectation::new(OutputLocator::fixed("output.txt"), "42"));

    let report = Orchestrator::new(config)
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    assert!(matches!(
        report.entries[0].outcome,
        Outcome::Mismatch { ref detail } if detail.contains("output.txt")
    ));
    assert_eq!(report.entries[0].exit_code, Some(0));
}

#[tokio::test]
async fn wrong_value_is_mismatch() {
    let project = ScriptProject::new(WRITE_PER_ID);
    let sweep = SweepSpec::new()
        .with_axis("N", [5, 6])
        .with_expectation(Expectation::new(OutputLocator::per_id(), "5"));

    let report = Orchestrator::new(project.config())
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    let labels: Vec<&str> = report.outcomes().map(Outcome::label).collect();
    assert_eq!(labels, vec!["pass", "mismatch"]);
    assert_eq!(report.summary().mismatched, 1);
}

#[tokio::test]
async fn failing_build_does_not_block_siblings() {
    let template = format!("# {{{{TAG}}}}\n{WRITE_PER_ID}");
    let project = ScriptProject::new(&template);
    let sweep = SweepSpec::new()
        .with_point([("TAG", "FAIL"), ("N", "1")])
        .with_point([("TAG", "ok"), ("N", "2")])
        .with_expectation(Expectation::new(OutputLocator::per_id(), "{{N}}"));

    let report = Orchestrator::new(project.config())
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    let labels: Vec<&str> = report.outcomes().map(Outcome::label).collect();
    assert_eq!(labels, vec!["build-failed", "pass"]);
    assert!(report.entries[0].stdout.is_none());
}

#[tokio::test]
async fn unbound_placeholder_is_a_build_failure() {
    let project = ScriptProject::new("echo {{MISSING}}\n");
    let sweep = SweepSpec::new().with_point([("N", 1)]);

    let report = Orchestrator::new(project.config())
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    match &report.entries[0].outcome {
        Outcome::BuildFailed { diagnostics } => assert!(diagnostics.contains("MISSING")),
        other => panic!("expected build failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_variant_times_out() {
    let project = ScriptProject::new(SLEEP_THEN_PRINT);
    let config = project
        .config()
        .with_run_timeout(Duration::from_millis(300));
    let sweep = SweepSpec::new()
        .with_axis("SECONDS", ["0", "10"])
        .with_expectation(Expectation::new(OutputLocator::Stdout, "done"));

    let report = Orchestrator::new(config)
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    assert_eq!(report.entries[0].outcome, Outcome::Pass);
    assert_eq!(
        report.entries[1].outcome,
        Outcome::RunFailed {
            failure: RunFailure::Timeout { after_ms: 300 }
        }
    );
}

#[tokio::test]
async fn timed_out_variant_leaves_no_process_behind() {
    let project = ScriptProject::new("sleep 1\ntouch '{{MARKER}}'\n");
    let marker = project.path().join("survived");
    let config = project
        .config()
        .with_run_command("bash ./main\necho finished")
        .with_run_timeout(Duration::from_millis(300));
    let sweep = SweepSpec::new().with_point([("MARKER", marker.display().to_string())]);

    let report = Orchestrator::new(config)
        .run(plan_from(0, &sweep))
        .await
        .unwrap();

    assert_eq!(
        report.entries[0].outcome,
        Outcome::RunFailed {
            failure: RunFailure::Timeout { after_ms: 300 }
        }
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn non_zero_exit_is_run_failure() {
    let project = ScriptProject::new("echo partial\nexit {{default CODE 3}}\n");
    let report = Orchestrator::new(project.config())
        .run(plan_from(0, &SweepSpec::new().with_point([("CODE", 4)])))
        .await
        .unwrap();

    let entry = &report.entries[0];
    assert_eq!(
        entry.outcome,
        Outcome::RunFailed {
            failure: RunFailure::NonZeroExit { code: 4 }
        }
    );
    assert_eq!(entry.stdout.as_deref(), Some("partial\n"));
}

#[tokio::test]
async fn identity_and_devices_reach_the_process() {
    let project = ScriptProject::new(ENV_ECHO);
    let sweep = SweepSpec::new().with_axis("N", [1, 2, 3]);
    let plan = Planner::new(PlanState::new(10).with_devices(vec!["0".into(), "1".into()]))
        .plan(&sweep)
        .unwrap();

    let report = Orchestrator::new(project.config()).run(plan).await.unwrap();

    let lines: Vec<&str> = report
        .entries
        .iter()
        .map(|entry| entry.stdout.as_deref().unwrap_or_default().trim_end())
        .collect();
    assert_eq!(
        lines,
        vec!["id=10 devices=0", "id=11 devices=1", "id=12 devices=0"]
    );
}

#[tokio::test]
async fn consecutive_plans_never_reuse_ids() {
    let project = ScriptProject::new(WRITE_PER_ID);
    let sweep = SweepSpec::new()
        .with_axis("N", [1, 2])
        .with_expectation(Expectation::new(OutputLocator::per_id(), "{{N}}"));
    let mut planner = Planner::new(PlanState::new(0));
    let orchestrator = Orchestrator::new(project.config());

    let first = orchestrator.run(planner.plan(&sweep).unwrap()).await.unwrap();
    let second = orchestrator.run(planner.plan(&sweep).unwrap()).await.unwrap();

    let first_ids: Vec<u64> = first.entries.iter().map(|e| e.id.value()).collect();
    let second_ids: Vec<u64> = second.entries.iter().map(|e| e.id.value()).collect();
    assert_eq!(first_ids, vec![0, 1]);
    assert_eq!(second_ids, vec![2, 3]);
    assert!(first.passed() && second.passed());
}

#[tokio::test]
async fn cancelled_run_lists_omitted_variants() {
    let project = ScriptProject::new(SLEEP_THEN_PRINT);
    let orchestrator = Orchestrator::new(project.config().with_workers(1));
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });

    let sweep = SweepSpec::new().with_axis("SECONDS", ["0", "10", "10"]);
    let report = orchestrator.run(plan_from(0, &sweep)).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].outcome, Outcome::Pass);
    assert_eq!(report.omitted, vec![VariantId(1), VariantId(2)]);
    assert!(!report.passed());
}

#[tokio::test]
async fn saved_report_resumes_where_it_stopped() {
    let project = ScriptProject::new(WRITE_PER_ID);
    let sweep = SweepSpec::new()
        .with_axis("N", [1, 2, 3])
        .with_expectation(Expectation::new(OutputLocator::per_id(), "{{N}}"));
    let orchestrator = Orchestrator::new(project.config());

    let full = orchestrator.run(plan_from(0, &sweep)).await.unwrap();
    let mut partial = full.clone();
    partial.entries.retain(|entry| entry.id != VariantId(1));
    let path = project.path().join("report.json");
    partial.save(&path).unwrap();

    let previous = Report::load(&path).unwrap();
    let resumed = orchestrator.resume(plan_from(0, &sweep), &previous).await.unwrap();

    let ids: Vec<VariantId> = resumed.entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![VariantId(0), VariantId(1), VariantId(2)]);
    assert_eq!(resumed.entries[0], full.entries[0]);
    assert_eq!(resumed.entries[2], full.entries[2]);
    assert!(resumed.passed());
}
