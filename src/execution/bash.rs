//! Bash scheduler - runs stages as local shell subprocesses

use crate::core::{BackendKind, CommandSpec, SchedulerDetail, Stage};
use crate::execution::scheduler::{ScheduleError, StageScheduler};
use crate::execution::sink::{OutputSink, Stream, TracingSink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long output readers may keep draining after the shell has exited
const READER_GRACE: Duration = Duration::from_millis(500);

/// Shell exit codes for "command not found" and "found but not executable"
const EXIT_NOT_FOUND: i32 = 127;
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Scheduler for the `Bash` backend
///
/// Renders the stage's [`CommandSpec`] to one line and runs it with
/// `<shell> -c <line>`. Stdout and stderr are drained by two independent
/// tasks into the configured [`OutputSink`].
///
/// Each stage runs in its own process group. If the stage is abandoned
/// before the shell exits (timeout, cancelled task), the whole group is
/// killed and the readers are aborted.
#[derive(Clone)]
pub struct BashScheduler {
    /// Shell executable
    shell: String,

    /// Working directory for every stage (inherits ours if unset)
    working_dir: Option<PathBuf>,

    /// Extra environment variables
    env: Vec<(String, String)>,

    sink: Arc<dyn OutputSink>,
}

impl Default for BashScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BashScheduler {
    /// Scheduler using `bash` on PATH and logging output through tracing
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
            working_dir: None,
            env: Vec::new(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run a command on behalf of `stage`
    ///
    /// Returns `Ok(true)` iff the process exits with code 0. A process killed
    /// by a signal has no exit code and counts as a failure. Exit codes 126
    /// and 127 are the shell reporting that a command could not be run, and
    /// surface as [`ScheduleError::CommandNotFound`].
    ///
    /// Background processes that inherit stdout/stderr do not hold the stage
    /// open: once the shell exits the readers get [`READER_GRACE`] to finish.
    pub async fn run_command(&self, stage: &str, command: &CommandSpec) -> Result<bool, ScheduleError> {
        let line = command.render();
        debug!(stage, command = %line, "Spawning stage subprocess");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ScheduleError::Spawn {
            stage: stage.to_string(),
            source,
        })?;

        let mut guard = StageProcess {
            pgid: child.id(),
            readers: [
                child
                    .stdout
                    .take()
                    .map(|out| tokio::spawn(drain(out, Stream::Stdout, stage.to_string(), self.sink.clone()))),
                child
                    .stderr
                    .take()
                    .map(|err| tokio::spawn(drain(err, Stream::Stderr, stage.to_string(), self.sink.clone()))),
            ]
            .into_iter()
            .flatten()
            .collect(),
        };

        let status = child.wait().await.map_err(|source| ScheduleError::Wait {
            stage: stage.to_string(),
            source,
        })?;
        // The shell exited on its own; leave its background jobs alone
        guard.pgid = None;
        guard.finish(stage).await;

        match status.code() {
            Some(0) => {
                info!(stage, "Stage subprocess exited successfully");
                Ok(true)
            }
            Some(code @ (EXIT_NOT_FOUND | EXIT_NOT_EXECUTABLE)) => {
                warn!(stage, code, "Stage command could not be executed");
                Err(ScheduleError::CommandNotFound {
                    stage: stage.to_string(),
                    code,
                })
            }
            Some(code) => {
                warn!(stage, code, "Stage subprocess exited with non-zero code");
                Ok(false)
            }
            None => {
                warn!(stage, "Stage subprocess terminated by signal");
                Ok(false)
            }
        }
    }
}

/// Output readers and process group of one running stage
///
/// Dropped while `pgid` is still set means the stage was abandoned mid-run.
struct StageProcess {
    pgid: Option<u32>,
    readers: Vec<JoinHandle<()>>,
}

impl StageProcess {
    /// Give the readers [`READER_GRACE`] to reach EOF, then give up on them
    async fn finish(&mut self, stage: &str) {
        let deadline = tokio::time::Instant::now() + READER_GRACE;
        for reader in &mut self.readers {
            match tokio::time::timeout_at(deadline, &mut *reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(stage, "Output reader task failed: {}", e),
                Err(_) => {
                    debug!(stage, "Output still open after shell exit, detaching reader");
                    reader.abort();
                }
            }
        }
    }
}

impl Drop for StageProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!(pgid, "Failed to kill stage process group: {}", e);
            }
        }
    }
}

async fn drain<R>(reader: R, stream: Stream, stage: String, sink: Arc<dyn OutputSink>)
where
    R: AsyncRead + Unpin,
{
    let tag = stream.tag(&stage);
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => sink.line(stream, &tag, &line),
            Ok(None) => break,
            Err(e) => {
                warn!(stage = %stage, "Failed reading {:?}: {}", stream, e);
                break;
            }
        }
    }
}

#[async_trait]
impl StageScheduler for BashScheduler {
    fn backend(&self) -> BackendKind {
        BackendKind::Bash
    }

    async fn schedule(&self, stage: &Stage) -> Result<bool, ScheduleError> {
        match stage.detail_for(BackendKind::Bash) {
            Some(SchedulerDetail::Bash { command }) => self.run_command(&stage.name, command).await,
            _ => {
                debug!(stage = %stage.name, "No bash descriptor, not runnable on this backend");
                Ok(false)
            }
        }
    }
}
