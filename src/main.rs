use anyhow::{Context, Result};
use stagegraph::cli::commands::{GraphCommand, OrderCommand, RunCommand, ValidateCommand};
use stagegraph::cli::output::*;
use stagegraph::cli::{Cli, Command};
use stagegraph::core::config::PipelineConfig;
use stagegraph::execution::{
    BashScheduler, ExecutionEvent, ExecutionGraph, Orchestrator, OrchestratorConfig, OrchestratorError, ValidationErrors,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for pipelines that fail validation
const EXIT_INVALID: i32 = 2;

/// The pipeline could not be loaded or did not pass validation
#[derive(Debug, Error)]
enum InvalidPipeline {
    #[error("{0:#}")]
    Config(anyhow::Error),

    #[error(transparent)]
    Graph(#[from] ValidationErrors),

    #[error(transparent)]
    Run(#[from] OrchestratorError),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to set logging subscriber")?;

    // Execute command
    let result = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Graph(cmd) => export_graph(cmd).map(|_| 0),
        Command::Order(cmd) => show_order(cmd).map(|_| 0),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<InvalidPipeline>() {
            Some(invalid) => {
                println!("{} Validation failed:", CROSS);
                println!("  {}", style(invalid).red());
                EXIT_INVALID
            }
            None => return Err(e),
        },
    };
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

fn load_config(file: &str) -> Result<PipelineConfig> {
    PipelineConfig::from_file(file)
        .with_context(|| format!("Failed to load pipeline config {}", file))
        .map_err(|e| InvalidPipeline::Config(e).into())
}

fn build_graph(config: &PipelineConfig) -> Result<ExecutionGraph> {
    Ok(ExecutionGraph::build(&config.to_pipeline()).map_err(InvalidPipeline::from)?)
}

/// Returns the process exit code for the finished run
async fn run_pipeline(cmd: &RunCommand) -> Result<i32> {
    // Load pipeline config
    let config = load_config(&cmd.file)?;
    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    // Apply variable overrides
    let overrides: HashMap<String, String> = cmd.variable.iter().cloned().collect();
    for (key, value) in &overrides {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    let pipeline = config.to_pipeline_with(&overrides);

    let mut scheduler = BashScheduler::new().with_shell(cmd.shell.clone());
    if let Some(dir) = &cmd.workdir {
        scheduler = scheduler.with_working_dir(dir);
    }

    let mut orchestrator_config = OrchestratorConfig::new()
        .with_strategy(cmd.scheduling_strategy())
        .with_require_all_stages(cmd.require_all_stages);
    if let Some(secs) = cmd.stage_timeout {
        orchestrator_config = orchestrator_config.with_stage_timeout(Duration::from_secs(secs));
    }

    // Set up event handler for console output
    let progress = create_progress_bar(pipeline.stages.len());
    let bar = progress.clone();
    let orchestrator = Orchestrator::new(Arc::new(scheduler), orchestrator_config).with_event_handler(move |event| {
        bar.println(format_execution_event(&event));
        match event {
            ExecutionEvent::StageSucceeded { .. }
            | ExecutionEvent::StageFailed { .. }
            | ExecutionEvent::StageSkipped { .. } => bar.inc(1),
            ExecutionEvent::StageStarted { stage } => bar.set_message(stage),
            _ => {}
        }
    });

    // Cancel on Ctrl-C: running stages finish, nothing new starts
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let result = orchestrator.run_with_cancel(&pipeline, cancel).await;
    progress.finish_and_clear();
    let report = result.map_err(InvalidPipeline::from)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", format_report(&report));
    }

    if !report.is_success() {
        error!("{}", report.summary());
    }

    Ok(report.exit_code())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating pipeline...", INFO);

    let config = load_config(&cmd.file)?;
    let graph = build_graph(&config)?;
    let order = graph.topological_order()?;

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Stages: {}", style(config.stages.len()).cyan());
    println!("  Inputs: {}", style(config.inputs.len()).cyan());
    println!("  Outputs: {}", style(config.outputs.len()).cyan());
    println!("  Order: {}", style(order.join(" → ")).dim());

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(0)
}

fn export_graph(cmd: &GraphCommand) -> Result<()> {
    let dot = build_graph(&load_config(&cmd.file)?)?.to_dot();
    match &cmd.output {
        Some(path) => {
            std::fs::write(path, dot).with_context(|| format!("Failed to write {}", path))?;
            println!("{} Graph written to {}", CHECK, style(path).bold());
        }
        None => print!("{}", dot),
    }
    Ok(())
}

fn show_order(cmd: &OrderCommand) -> Result<()> {
    let graph = build_graph(&load_config(&cmd.file)?)?;
    for (position, stage) in graph.topological_order()?.iter().enumerate() {
        let producers = graph.producers_of(stage);
        if producers.is_empty() {
            println!("{:>3}. {}", position + 1, style(stage).bold());
        } else {
            println!(
                "{:>3}. {} {}",
                position + 1,
                style(stage).bold(),
                style(format!("(after {})", producers.join(", "))).dim()
            );
        }
    }
    Ok(())
}
