//! Stage scheduler - backend abstraction for running a single stage

use crate::core::{BackendKind, Stage};
use async_trait::async_trait;
use thiserror::Error;

/// Scheduler infrastructure failure
///
/// A stage that ran and failed is *not* an error: schedulers report it as
/// `Ok(false)`. These variants mean the stage could not be run at all.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to spawn stage '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for stage '{stage}': {source}")]
    Wait {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// The shell ran but could not find or execute the stage's command
    #[error("command for stage '{stage}' could not be executed (shell exit code {code})")]
    CommandNotFound { stage: String, code: i32 },

    #[error("backend error for stage '{stage}': {message}")]
    Backend { stage: String, message: String },
}

/// Runs stages on one backend
#[async_trait]
pub trait StageScheduler: Send + Sync {
    /// Backend whose descriptors this scheduler understands
    fn backend(&self) -> BackendKind;

    /// Run a stage to completion
    ///
    /// Resolves `Ok(false)` immediately when the stage has no descriptor for
    /// this backend, `Ok(true)` iff the stage ran successfully, and `Err`
    /// only when the stage could not be started or observed.
    async fn schedule(&self, stage: &Stage) -> Result<bool, ScheduleError>;
}
