use crate::helpers::*;
use stagegraph::core::config::PipelineConfig;
use stagegraph::core::RunStatus;
use stagegraph::execution::{
    BashScheduler, MemorySink, Orchestrator, OrchestratorConfig, OrchestratorError, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;

fn pipeline_yaml(log: &str) -> String {
    format!(
        r#"
name: "somatic"
variables:
  log: "{log}"
  sample: "COLO829T"
inputs: [tumor.bam]
outputs: [report.txt]
stages:
  - name: call
    inputs: [tumor.bam]
    outputs: [calls.vcf]
    bash:
      command:
        - "echo call-{{{{ sample }}}} >> {{{{ log }}}}"
  - name: annotate
    inputs: [calls.vcf]
    outputs: [annotated.vcf]
    bash:
      command:
        - "echo annotate >> {{{{ log }}}}"
        - "false"
        - "echo unreachable >> {{{{ log }}}}"
  - name: report
    inputs: [annotated.vcf]
    outputs: [report.txt]
    bash:
      command: "echo report >> {{{{ log }}}}"
"#
    )
}

#[tokio::test]
async fn test_yaml_pipeline_runs_with_fail_fast_groups() {
    let log = scratch_path("yaml.log");
    let config = PipelineConfig::from_yaml(&pipeline_yaml(&log.display().to_string())).unwrap();
    let mut overrides = HashMap::new();
    overrides.insert("sample".to_string(), "COLO829R".to_string());
    let pipeline = config.to_pipeline_with(&overrides);

    let sink = Arc::new(MemorySink::new());
    let scheduler = Arc::new(BashScheduler::new().with_shell("sh").with_sink(sink));
    let report = run_with(&pipeline, scheduler, OrchestratorConfig::new()).await;

    let written = std::fs::read_to_string(&log).unwrap_or_default();
    let _ = std::fs::remove_file(&log);

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.succeeded(), vec!["call"]);
    assert_eq!(report.failed(), vec!["annotate"]);
    assert_eq!(report.skipped(), vec!["report"]);
    assert_eq!(written.lines().collect::<Vec<_>>(), vec!["call-COLO829R", "annotate"]);
}

#[tokio::test]
async fn test_invalid_yaml_pipeline_is_rejected_before_running() {
    let yaml = r#"
name: "broken"
stages:
  - name: first
    inputs: [second.out]
    outputs: [first.out]
    bash:
      command: "true"
  - name: second
    inputs: [first.out]
    outputs: [second.out]
    bash:
      command: "true"
  - name: orphan
    inputs: [nowhere.txt]
    outputs: [orphan.out]
    bash:
      command: "true"
"#;
    let pipeline = PipelineConfig::from_yaml(yaml).unwrap().to_pipeline();
    let scheduler = Arc::new(FakeScheduler::new());

    let result = Orchestrator::new(scheduler.clone(), OrchestratorConfig::new())
        .run(&pipeline)
        .await;

    match result {
        Err(OrchestratorError::Validation(errors)) => {
            assert!(errors
                .errors()
                .iter()
                .any(|e| matches!(e, ValidationError::Cycle { .. })));
            assert!(errors.errors().iter().any(|e| matches!(
                e,
                ValidationError::UnresolvedInput { stage, resource } if stage == "orphan" && resource == "nowhere.txt"
            )));
        }
        other => panic!("expected validation errors, got {:?}", other.map(|r| r.summary())),
    }
    assert_eq!(scheduler.total_invocations(), 0);
}

#[test]
fn test_config_rejects_stage_without_backend() {
    let yaml = r#"
name: "nobackend"
stages:
  - name: lonely
    outputs: [x]
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("declares no backend"), "{}", err);
}
