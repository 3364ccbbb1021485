use crate::helpers::*;
use stagegraph::core::{FailureReason, Pipeline, Resource, RunStatus, SchedulerDetail, SkipReason, Stage, StageState};
use stagegraph::execution::OrchestratorConfig;
use std::sync::Arc;

/// `prepare -> containerised -> report`, where the middle stage only runs on the cluster
fn mixed_backends() -> Pipeline {
    let containerised = Stage::new("containerised")
        .with_input(Resource::file("prepared"))
        .with_output(Resource::file("scored"))
        .with_detail(SchedulerDetail::Cluster {
            image_name: "scorer".to_string(),
            image_version: "2.0".to_string(),
            mounts: Vec::new(),
        });

    Pipeline::new("mixed")
        .with_input(Resource::file("in"))
        .with_stage(stage("prepare", &["in"], &["prepared"]))
        .with_stage(containerised)
        .with_stage(stage("report", &["scored"], &["report.html"]))
}

#[tokio::test]
async fn test_mismatch_is_skipped_and_dependents_still_run() {
    let scheduler = Arc::new(FakeScheduler::new());
    let report = run_with(&mixed_backends(), scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(report.status, RunStatus::Succeeded, "{}", report.summary());
    assert_eq!(
        report.state_of("containerised"),
        Some(&StageState::Skipped { reason: SkipReason::BackendMismatch })
    );
    assert_stage_label(&report, "report", "SUCCEEDED");
    assert_eq!(scheduler.invocations("containerised"), 0);
}

#[tokio::test]
async fn test_require_all_stages_fails_on_mismatch() {
    let scheduler = Arc::new(FakeScheduler::new());
    let config = OrchestratorConfig::new().with_require_all_stages(true);
    let report = run_with(&mixed_backends(), scheduler.clone(), config).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.state_of("containerised"),
        Some(StageState::Failed { reason: FailureReason::BackendMismatch, started_at: None, .. })
    ));
    assert_eq!(
        report.state_of("report"),
        Some(&StageState::Skipped {
            reason: SkipReason::AncestorFailed { ancestor: "containerised".to_string() }
        })
    );
    assert_eq!(scheduler.invocations("report"), 0);
}
