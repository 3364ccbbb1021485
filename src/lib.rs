//! stagegraph - a dependency-graph pipeline orchestrator

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use crate::core::{BackendKind, CommandSpec, Pipeline, Resource, RunReport, SchedulerDetail, Stage, StageState};
pub use execution::{BashScheduler, ExecutionGraph, Orchestrator, OrchestratorConfig, StageScheduler};
