use crate::helpers::*;
use stagegraph::core::{CommandSpec, FailureReason, Pipeline, Resource, SkipReason, StageState};
use stagegraph::execution::{BashScheduler, OrchestratorConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_stage_exceeding_timeout_fails_and_skips_dependents() {
    let pipeline = Pipeline::new("slow")
        .with_input(Resource::file("in"))
        .with_stage(bash_stage("sleepy", &["in"], &["out"], CommandSpec::line("sleep 5")))
        .with_stage(bash_stage("after", &["out"], &["done"], CommandSpec::line("true")));
    let scheduler = Arc::new(BashScheduler::new().with_shell("sh"));
    let limit = Duration::from_millis(200);
    let config = OrchestratorConfig::new().with_stage_timeout(limit);

    let started = Instant::now();
    let report = run_with(&pipeline, scheduler, config).await;

    assert!(started.elapsed() < Duration::from_secs(4), "timeout did not stop the stage");
    assert!(matches!(
        report.state_of("sleepy"),
        Some(StageState::Failed { reason: FailureReason::Timeout { after }, .. }) if *after == limit
    ));
    assert_eq!(
        report.state_of("after"),
        Some(&StageState::Skipped {
            reason: SkipReason::AncestorFailed { ancestor: "sleepy".to_string() }
        })
    );
}
