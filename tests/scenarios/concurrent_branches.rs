use crate::helpers::*;
use stagegraph::core::{CommandSpec, Pipeline, Resource, RunStatus};
use stagegraph::execution::{BashScheduler, MemorySink, OrchestratorConfig, SchedulingStrategy};
use std::sync::Arc;
use std::time::Duration;

/// Two reporting stages that only share the external input
fn orange_reporting(rose: CommandSpec, protect: CommandSpec) -> Pipeline {
    Pipeline::new("orange-reporting")
        .with_input(Resource::file("orange.json"))
        .with_stage(bash_stage("rose", &["orange.json"], &["rose.tsv"], rose))
        .with_stage(bash_stage("protect", &["orange.json"], &["protect.tsv"], protect))
}

#[tokio::test]
async fn test_independent_stages_run_concurrently() {
    let pipeline = orange_reporting(CommandSpec::line("true"), CommandSpec::line("true"));
    let scheduler = Arc::new(FakeScheduler::new().with_delay(Duration::from_millis(100)));

    let report = run_with(&pipeline, scheduler.clone(), OrchestratorConfig::new()).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(scheduler.max_concurrency(), 2);
}

#[tokio::test]
async fn test_sequential_strategy_runs_one_at_a_time() {
    let pipeline = orange_reporting(CommandSpec::line("true"), CommandSpec::line("true"));
    let scheduler = Arc::new(FakeScheduler::new().with_delay(Duration::from_millis(20)));
    let config = OrchestratorConfig::new().with_strategy(SchedulingStrategy::Sequential);

    run_with(&pipeline, scheduler.clone(), config).await;

    assert_eq!(scheduler.max_concurrency(), 1);
    assert_eq!(scheduler.log(), vec!["start:rose", "end:rose", "start:protect", "end:protect"]);
}

#[tokio::test]
async fn test_bash_stages_overlap_and_output_is_tagged() {
    // Each stage waits for the other's marker, so both must be running at once
    let dir = scratch_path("overlap");
    std::fs::create_dir_all(&dir).unwrap();
    let wait_for = |marker: &str| {
        format!(
            "i=0; while [ ! -f {m} ] && [ $i -lt 100 ]; do sleep 0.05; i=$((i+1)); done; test -f {m}",
            m = dir.join(marker).display()
        )
    };
    let touch = |marker: &str| format!("touch {}", dir.join(marker).display());

    let rose = CommandSpec::group(vec![
        CommandSpec::line(touch("rose.started")),
        CommandSpec::line(wait_for("protect.started")),
        CommandSpec::line("echo rose done"),
    ]);
    let protect = CommandSpec::group(vec![
        CommandSpec::line(touch("protect.started")),
        CommandSpec::line(wait_for("rose.started")),
        CommandSpec::line("echo protect done"),
    ]);

    let sink = Arc::new(MemorySink::new());
    let scheduler = Arc::new(BashScheduler::new().with_shell("sh").with_sink(sink.clone()));
    let report = run_with(&orange_reporting(rose, protect), scheduler, OrchestratorConfig::new()).await;
    let _ = std::fs::remove_dir_all(&dir);

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(sink.lines_for("rose-info"), vec!["rose done"]);
    assert_eq!(sink.lines_for("protect-info"), vec!["protect done"]);
}
