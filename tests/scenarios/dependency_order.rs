use crate::helpers::*;
use stagegraph::core::{Pipeline, Resource, RunStatus};
use stagegraph::execution::{ExecutionGraph, OrchestratorConfig, SchedulingStrategy};
use std::sync::Arc;
use std::time::Duration;

/// Diamond: split feeds left and right, join needs both
fn diamond() -> Pipeline {
    Pipeline::new("diamond")
        .with_input(Resource::file("reads.bam"))
        .with_stage(stage("join", &["left.vcf", "right.vcf"], &["merged.vcf"]))
        .with_stage(stage("left", &["split.txt"], &["left.vcf"]))
        .with_stage(stage("split", &["reads.bam"], &["split.txt"]))
        .with_stage(stage("right", &["split.txt"], &["right.vcf"]))
}

const DIAMOND_EDGES: &[(&str, &str)] = &[
    ("split", "left"),
    ("split", "right"),
    ("left", "join"),
    ("right", "join"),
];

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let scheduler = Arc::new(FakeScheduler::new());
    let report = run_with(&chain_pipeline(), scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(
        scheduler.log(),
        vec!["start:A", "end:A", "start:B", "end:B", "start:C", "end:C"]
    );
}

#[tokio::test]
async fn test_diamond_respects_producers_under_every_strategy() {
    for strategy in [
        SchedulingStrategy::Sequential,
        SchedulingStrategy::Parallel,
        SchedulingStrategy::LimitedParallel(2),
    ] {
        let scheduler = Arc::new(FakeScheduler::new().with_delay(Duration::from_millis(20)));
        let config = OrchestratorConfig::new().with_strategy(strategy);
        let report = run_with(&diamond(), scheduler.clone(), config).await;

        assert!(report.is_success(), "{:?}: {}", strategy, report.summary());
        assert_eq!(scheduler.total_invocations(), 4);
        assert_dependencies_respected(&report, &scheduler, DIAMOND_EDGES);
    }
}

#[tokio::test]
async fn test_report_lists_stages_in_declaration_order() {
    let scheduler = Arc::new(FakeScheduler::new());
    let report = run_with(&diamond(), scheduler, OrchestratorConfig::new()).await;

    let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["join", "left", "split", "right"]);
}

#[test]
fn test_topological_order_puts_producers_first() {
    let graph = ExecutionGraph::build(&diamond()).unwrap();
    let order = graph.topological_order().unwrap();
    let pos = |name: &str| order.iter().position(|s| s == name).unwrap();

    for (producer, consumer) in DIAMOND_EDGES {
        assert!(pos(producer) < pos(consumer), "{:?}", order);
    }
    assert_eq!(order.len(), 4);
}
