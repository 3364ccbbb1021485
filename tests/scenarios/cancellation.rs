use crate::helpers::*;
use stagegraph::core::{RunStatus, SkipReason, StageState};
use stagegraph::execution::{Orchestrator, OrchestratorConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancel_lets_running_stage_finish_and_skips_the_rest() {
    let scheduler = Arc::new(FakeScheduler::new().with_delay(Duration::from_millis(200)));
    let orchestrator = Orchestrator::new(scheduler.clone(), OrchestratorConfig::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = orchestrator
        .run_with_cancel(&chain_pipeline(), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.status, RunStatus::Failed);
    assert_stage_label(&report, "A", "SUCCEEDED");
    for stage in ["B", "C"] {
        assert_eq!(
            report.state_of(stage),
            Some(&StageState::Skipped { reason: SkipReason::Cancelled })
        );
    }
    assert_eq!(scheduler.total_invocations(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let scheduler = Arc::new(FakeScheduler::new());
    let orchestrator = Orchestrator::new(scheduler.clone(), OrchestratorConfig::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator
        .run_with_cancel(&chain_pipeline(), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.skipped(), vec!["A", "B", "C"]);
    assert_eq!(scheduler.total_invocations(), 0);
}
