//! Output sinks for stage subprocess output
//!
//! Every line a stage writes is delivered to an [`OutputSink`] together with
//! a tag: `<stage>-info` for stdout and `<stage>-error` for stderr. The sink
//! is injected into the scheduler, so tests can capture output without any
//! global logger state.

use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Tag for a line of this stream produced by `stage`
    pub fn tag(&self, stage: &str) -> String {
        match self {
            Stream::Stdout => format!("{}-info", stage),
            Stream::Stderr => format!("{}-error", stage),
        }
    }
}

/// Receiver for stage output lines
///
/// Called concurrently from the stdout and stderr readers of every running
/// stage, so implementations must be thread-safe.
pub trait OutputSink: Send + Sync {
    fn line(&self, stream: Stream, tag: &str, line: &str);
}

/// Forwards output lines to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, stream: Stream, tag: &str, line: &str) {
        match stream {
            Stream::Stdout => info!(target: "stage_output", tag, "{}", line),
            Stream::Stderr => error!(target: "stage_output", tag, "{}", line),
        }
    }
}

/// Keeps every line in memory, in arrival order
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(tag, line)` pairs received so far
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Lines received under one tag
    pub fn lines_for(&self, tag: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, line)| line)
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, _stream: Stream, tag: &str, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((tag.to_string(), line.to_string()));
        }
    }
}
