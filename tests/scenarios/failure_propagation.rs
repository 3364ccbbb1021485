use crate::helpers::*;
use stagegraph::core::{FailureReason, Pipeline, Resource, RunStatus, SkipReason, StageState};
use stagegraph::execution::OrchestratorConfig;
use std::sync::Arc;

#[tokio::test]
async fn test_failure_skips_every_descendant() {
    let scheduler = Arc::new(FakeScheduler::new().with_script("A", Script::Fail));
    let report = run_with(&chain_pipeline(), scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert!(matches!(
        report.state_of("A"),
        Some(StageState::Failed { reason: FailureReason::ExitFailure, .. })
    ));
    for skipped in ["B", "C"] {
        assert_eq!(
            report.state_of(skipped),
            Some(&StageState::Skipped {
                reason: SkipReason::AncestorFailed { ancestor: "A".to_string() }
            })
        );
        assert_eq!(scheduler.invocations(skipped), 0);
    }
}

#[tokio::test]
async fn test_independent_branch_keeps_running() {
    let pipeline = Pipeline::new("branches")
        .with_input(Resource::file("in"))
        .with_stage(stage("broken", &["in"], &["x"]))
        .with_stage(stage("after_broken", &["x"], &["y"]))
        .with_stage(stage("healthy", &["in"], &["z"]))
        .with_stage(stage("after_healthy", &["z"], &["w"]));
    let scheduler = Arc::new(FakeScheduler::new().with_script("broken", Script::Fail));

    let report = run_with(&pipeline, scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed(), vec!["broken"]);
    assert_eq!(report.skipped(), vec!["after_broken"]);
    assert_eq!(report.succeeded(), vec!["healthy", "after_healthy"]);
    assert_eq!(scheduler.invocations("after_healthy"), 1);
}

#[tokio::test]
async fn test_dispatch_fault_is_a_failure_with_message() {
    let scheduler = Arc::new(FakeScheduler::new().with_script("B", Script::Fault));
    let report = run_with(&chain_pipeline(), scheduler, OrchestratorConfig::new()).await;

    match report.state_of("B") {
        Some(StageState::Failed { reason: FailureReason::DispatchFault(msg), .. }) => {
            assert!(msg.contains("executor unavailable"), "{}", msg)
        }
        other => panic!("expected dispatch fault, got {:?}", other),
    }
    assert_stage_label(&report, "A", "SUCCEEDED");
    assert_stage_label(&report, "C", "SKIPPED");
}

#[tokio::test]
async fn test_failed_stage_is_not_retried() {
    let scheduler = Arc::new(FakeScheduler::new().with_script("A", Script::Fail));
    run_with(&chain_pipeline(), scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(scheduler.invocations("A"), 1);
    assert_eq!(scheduler.total_invocations(), 1);
}

#[tokio::test]
async fn test_consumer_of_two_producers_skipped_when_either_fails() {
    let pipeline = Pipeline::new("fan-in")
        .with_input(Resource::file("in"))
        .with_stage(stage("left", &["in"], &["l"]))
        .with_stage(stage("right", &["in"], &["r"]))
        .with_stage(stage("merge", &["l", "r"], &["m"]));
    let scheduler = Arc::new(FakeScheduler::new().with_script("right", Script::Fail));

    let report = run_with(&pipeline, scheduler.clone(), OrchestratorConfig::new()).await;

    assert_stage_label(&report, "left", "SUCCEEDED");
    assert_stage_label(&report, "right", "FAILED");
    assert_eq!(
        report.state_of("merge"),
        Some(&StageState::Skipped {
            reason: SkipReason::AncestorFailed { ancestor: "right".to_string() }
        })
    );
    assert_eq!(scheduler.invocations("merge"), 0);
}

#[tokio::test]
async fn test_missing_tool_is_a_dispatch_fault_not_an_exit_failure() {
    use stagegraph::core::CommandSpec;
    use stagegraph::execution::BashScheduler;

    let pipeline = Pipeline::new("missing-tool")
        .with_input(Resource::file("in"))
        .with_stage(bash_stage("annotate", &["in"], &["a.vcf"], CommandSpec::line("/nonexistent/tool --x")))
        .with_stage(bash_stage("report", &["a.vcf"], &["r.txt"], CommandSpec::line("true")));
    let scheduler = Arc::new(BashScheduler::new().with_shell("sh"));

    let report = run_with(&pipeline, scheduler, OrchestratorConfig::new()).await;

    match report.state_of("annotate") {
        Some(StageState::Failed { reason: FailureReason::DispatchFault(msg), .. }) => {
            assert!(msg.contains("exit code 127"), "{}", msg)
        }
        other => panic!("expected dispatch fault, got {:?}", other),
    }
    assert_stage_label(&report, "report", "SKIPPED");
}
