//! Pipeline execution: graph construction, schedulers and the orchestrator

pub mod bash;
pub mod engine;
pub mod graph;
pub mod scheduler;
pub mod sink;

pub use bash::BashScheduler;
pub use engine::{
    EventHandler, ExecutionEvent, Orchestrator, OrchestratorConfig, OrchestratorError, SchedulingStrategy,
};
pub use graph::{CycleError, ExecutionGraph, ValidationError, ValidationErrors};
pub use scheduler::{ScheduleError, StageScheduler};
pub use sink::{MemorySink, OutputSink, Stream, TracingSink};
