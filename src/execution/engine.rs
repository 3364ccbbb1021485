//! Orchestrator - walks the execution graph and dispatches stages

use crate::{
    core::{FailureReason, Pipeline, RunReport, RunStatus, SkipReason, Stage, StageOutcome, StageState},
    execution::{
        graph::{CycleError, ExecutionGraph, ValidationErrors},
        scheduler::StageScheduler,
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How many stages may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One stage at a time, in topological order
    Sequential,

    /// Every ready stage at once
    #[default]
    Parallel,

    /// At most N stages at once
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    pub fn max_in_flight(&self) -> usize {
        match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => usize::MAX,
            SchedulingStrategy::LimitedParallel(max) => (*max).max(1),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub strategy: SchedulingStrategy,

    /// Fail stages the active backend cannot run instead of skipping them
    pub require_all_stages: bool,

    /// Wall-clock limit per stage
    pub stage_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_require_all_stages(mut self, require: bool) -> Self {
        self.require_all_stages = require;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }
}

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        stages: usize,
    },
    StageReady {
        stage: String,
    },
    StageStarted {
        stage: String,
    },
    StageSucceeded {
        stage: String,
    },
    StageFailed {
        stage: String,
        reason: FailureReason,
    },
    StageSkipped {
        stage: String,
        reason: SkipReason,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Result of one dispatch, as seen by the event loop
#[derive(Debug)]
enum Outcome {
    Succeeded,
    Failed(FailureReason),
}

/// Drives a pipeline run on one backend
///
/// The per-run state table is owned by the event loop in
/// [`Orchestrator::run_with_cancel`]; dispatched stages report back through a
/// `JoinSet` and never touch it directly.
pub struct Orchestrator {
    scheduler: Arc<dyn StageScheduler>,
    config: OrchestratorConfig,
    event_handlers: Vec<EventHandler>,
}

impl Orchestrator {
    pub fn new(scheduler: Arc<dyn StageScheduler>, config: OrchestratorConfig) -> Self {
        Self {
            scheduler,
            config,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.add_event_handler(handler);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run every stage of the pipeline
    pub async fn run(&self, pipeline: &Pipeline) -> Result<RunReport, OrchestratorError> {
        self.run_with_cancel(pipeline, CancellationToken::new()).await
    }

    /// Run every stage of the pipeline until done or cancelled
    ///
    /// On cancellation running stages finish, nothing new is dispatched and
    /// every stage not yet dispatched is skipped.
    pub async fn run_with_cancel(
        &self,
        pipeline: &Pipeline,
        cancel: CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        let graph = ExecutionGraph::build(pipeline)?;
        let order = graph.topological_indices()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting pipeline run: {} ({})", pipeline.name, run_id);
        self.emit(ExecutionEvent::RunStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            stages: pipeline.stages.len(),
        });

        let mut run = RunTable::new(&graph, self.config.require_all_stages);
        for idx in 0..run.states.len() {
            if run.states[idx] == StageState::Ready {
                self.emit(ExecutionEvent::StageReady {
                    stage: run.names[idx].clone(),
                });
            }
        }

        let backend = self.scheduler.backend();
        let max_in_flight = self.config.strategy.max_in_flight();
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        let mut dispatched: HashMap<Id, usize> = HashMap::new();
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                warn!("Run {} cancelled, waiting for {} running stage(s)", run_id, in_flight.len());
                for idx in run.cancel_pending() {
                    self.emit(ExecutionEvent::StageSkipped {
                        stage: run.names[idx].clone(),
                        reason: SkipReason::Cancelled,
                    });
                }
            }

            if !cancelled {
                // Consumers always follow their producers in `order`, so
                // stages promoted during this pass are reached in the same pass
                for &idx in &order {
                    if in_flight.len() >= max_in_flight {
                        break;
                    }
                    if run.states[idx] != StageState::Ready {
                        continue;
                    }

                    let stage = &pipeline.stages[idx];
                    if !stage.supports(backend) {
                        self.backend_mismatch(&graph, &mut run, idx);
                        continue;
                    }

                    debug!("Dispatching stage {} to {} backend", stage.name, backend);
                    run.states[idx] = StageState::Running { started_at: Utc::now() };
                    self.emit(ExecutionEvent::StageStarted {
                        stage: stage.name.clone(),
                    });

                    let scheduler = self.scheduler.clone();
                    let stage = stage.clone();
                    let timeout = self.config.stage_timeout;
                    let task = in_flight.spawn(dispatch(scheduler, stage, timeout));
                    dispatched.insert(task.id(), idx);
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next_with_id() => match joined {
                    Some(Ok((id, outcome))) => match dispatched.remove(&id) {
                        Some(idx) => self.complete(&graph, &mut run, idx, outcome),
                        None => error!("Completion for unknown dispatch task {} in run {}", id, run_id),
                    },
                    Some(Err(e)) => match dispatched.remove(&e.id()) {
                        Some(idx) => self.lost(&graph, &mut run, idx, &e.to_string()),
                        None => error!("Dispatch task for run {} failed: {}", run_id, e),
                    },
                    None => break,
                },
                _ = cancel.cancelled(), if !cancelled => {}
            }
        }

        for idx in run.unfinished() {
            error!("Stage {} never reached a terminal state", run.names[idx]);
            run.states[idx] = StageState::Failed {
                reason: FailureReason::DispatchFault("stage never completed".to_string()),
                started_at: None,
                failed_at: Utc::now(),
            };
        }

        let status = if run.is_success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        let report = RunReport {
            run_id,
            pipeline_name: pipeline.name.clone(),
            status,
            stages: run
                .names
                .into_iter()
                .zip(run.states)
                .map(|(name, state)| StageOutcome { name, state })
                .collect(),
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        match status {
            RunStatus::Succeeded => info!("Pipeline run finished: {}", report.summary()),
            RunStatus::Failed => error!("Pipeline run finished: {}", report.summary()),
        }
        self.emit(ExecutionEvent::RunFinished { run_id, status });

        Ok(report)
    }

    fn complete(&self, graph: &ExecutionGraph, run: &mut RunTable, idx: usize, outcome: Outcome) {
        let started_at = match &run.states[idx] {
            StageState::Running { started_at } => *started_at,
            other => {
                warn!("Completion for stage {} in state {}", run.names[idx], other);
                Utc::now()
            }
        };

        match outcome {
            Outcome::Succeeded => {
                info!("Stage {} succeeded", run.names[idx]);
                run.states[idx] = StageState::Succeeded {
                    started_at,
                    finished_at: Utc::now(),
                };
                self.emit(ExecutionEvent::StageSucceeded {
                    stage: run.names[idx].clone(),
                });
                self.promote_consumers(graph, run, idx);
            }
            Outcome::Failed(reason) => {
                self.fail(graph, run, idx, reason, Some(started_at));
            }
        }
    }

    /// The dispatch task for `idx` died without reporting an outcome
    fn lost(&self, graph: &ExecutionGraph, run: &mut RunTable, idx: usize, message: &str) {
        let started_at = match &run.states[idx] {
            StageState::Running { started_at } => Some(*started_at),
            _ => None,
        };
        let reason = FailureReason::DispatchFault(format!("dispatch task failed: {}", message));
        self.fail(graph, run, idx, reason, started_at);
    }

    fn fail(
        &self,
        graph: &ExecutionGraph,
        run: &mut RunTable,
        idx: usize,
        reason: FailureReason,
        started_at: Option<chrono::DateTime<Utc>>,
    ) {
        match &reason {
            FailureReason::DispatchFault(msg) => {
                error!("Stage {} could not be run: {}", run.names[idx], msg)
            }
            other => warn!("Stage {} failed: {}", run.names[idx], other),
        }

        run.states[idx] = StageState::Failed {
            reason: reason.clone(),
            started_at,
            failed_at: Utc::now(),
        };
        self.emit(ExecutionEvent::StageFailed {
            stage: run.names[idx].clone(),
            reason,
        });

        for descendant in graph.descendants(idx) {
            if run.states[descendant].is_terminal() {
                continue;
            }
            let reason = SkipReason::AncestorFailed {
                ancestor: run.names[idx].clone(),
            };
            run.states[descendant] = StageState::Skipped { reason: reason.clone() };
            self.emit(ExecutionEvent::StageSkipped {
                stage: run.names[descendant].clone(),
                reason,
            });
        }
    }

    fn backend_mismatch(&self, graph: &ExecutionGraph, run: &mut RunTable, idx: usize) {
        if self.config.require_all_stages {
            self.fail(graph, run, idx, FailureReason::BackendMismatch, None);
        } else {
            info!(
                "Stage {} has no {} descriptor, skipping",
                run.names[idx],
                self.scheduler.backend()
            );
            run.states[idx] = StageState::Skipped {
                reason: SkipReason::BackendMismatch,
            };
            self.emit(ExecutionEvent::StageSkipped {
                stage: run.names[idx].clone(),
                reason: SkipReason::BackendMismatch,
            });
            self.promote_consumers(graph, run, idx);
        }
    }

    fn promote_consumers(&self, graph: &ExecutionGraph, run: &mut RunTable, idx: usize) {
        for &consumer in graph.consumers(idx) {
            if run.states[consumer] == StageState::Pending && run.producers_satisfied(graph, consumer) {
                run.states[consumer] = StageState::Ready;
                self.emit(ExecutionEvent::StageReady {
                    stage: run.names[consumer].clone(),
                });
            }
        }
    }
}

async fn dispatch(scheduler: Arc<dyn StageScheduler>, stage: Stage, timeout: Option<Duration>) -> Outcome {
    let name = stage.name.clone();
    // A panicking scheduler surfaces as a JoinError instead of tearing down the loop
    let task = tokio::spawn(async move { scheduler.schedule(&stage).await });
    let abort = task.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return Outcome::Failed(FailureReason::Timeout { after: limit });
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(true)) => Outcome::Succeeded,
        Ok(Ok(false)) => Outcome::Failed(FailureReason::ExitFailure),
        Ok(Err(e)) => Outcome::Failed(FailureReason::DispatchFault(e.to_string())),
        Err(e) => {
            error!("Scheduler task for stage {} failed: {}", name, e);
            Outcome::Failed(FailureReason::DispatchFault(format!("scheduler task failed: {}", e)))
        }
    }
}

/// Per-run state table, indexed by declaration order
struct RunTable {
    names: Vec<String>,
    states: Vec<StageState>,
    require_all_stages: bool,
}

impl RunTable {
    fn new(graph: &ExecutionGraph, require_all_stages: bool) -> Self {
        let names = graph.stage_names().to_vec();
        let states = (0..names.len())
            .map(|idx| {
                if graph.producers(idx).is_empty() {
                    StageState::Ready
                } else {
                    StageState::Pending
                }
            })
            .collect();
        Self {
            names,
            states,
            require_all_stages,
        }
    }

    fn satisfies_consumers(&self, idx: usize) -> bool {
        match &self.states[idx] {
            StageState::Succeeded { .. } => true,
            StageState::Skipped {
                reason: SkipReason::BackendMismatch,
            } => !self.require_all_stages,
            _ => false,
        }
    }

    fn producers_satisfied(&self, graph: &ExecutionGraph, idx: usize) -> bool {
        graph.producers(idx).iter().all(|p| self.satisfies_consumers(*p))
    }

    /// Skip every stage not yet dispatched; returns the skipped indices
    fn cancel_pending(&mut self) -> Vec<usize> {
        let mut skipped = Vec::new();
        for (idx, state) in self.states.iter_mut().enumerate() {
            if matches!(state, StageState::Pending | StageState::Ready) {
                *state = StageState::Skipped {
                    reason: SkipReason::Cancelled,
                };
                skipped.push(idx);
            }
        }
        skipped
    }

    fn unfinished(&self) -> Vec<usize> {
        (0..self.states.len())
            .filter(|idx| !self.states[*idx].is_terminal())
            .collect()
    }

    fn is_success(&self) -> bool {
        (0..self.states.len()).all(|idx| {
            self.states[idx].is_succeeded()
                || (!self.require_all_stages
                    && self.states[idx]
                        == StageState::Skipped {
                            reason: SkipReason::BackendMismatch,
                        })
        })
    }
}
