//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent stages for the parallel-limited strategy
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Fail stages that have no descriptor for the bash backend
    #[arg(long)]
    pub require_all_stages: bool,

    /// Per-stage timeout in seconds
    #[arg(long)]
    pub stage_timeout: Option<u64>,

    /// Shell used to run stage commands
    #[arg(long, default_value = "bash")]
    pub shell: String,

    /// Working directory for stage commands
    #[arg(long)]
    pub workdir: Option<String>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.max_parallel),
        }
    }
}

/// Validate a pipeline configuration and its dependency graph
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the dependency graph in Graphviz DOT format
#[derive(Debug, Args, Clone)]
pub struct GraphCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Print the stage execution order
#[derive(Debug, Args, Clone)]
pub struct OrderCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
