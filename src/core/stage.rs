//! Stage domain model

use crate::core::resource::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution environment able to run a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local subprocess through a shell
    Bash,
    /// Cluster-managed container
    Cluster,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Bash => f.write_str("bash"),
            BackendKind::Cluster => f.write_str("cluster"),
        }
    }
}

/// A shell command, either a single invocation or a fail-fast group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// One command line, passed to the shell as is
    Line(String),
    /// Ordered sub-commands run as one unit; the first failure aborts the rest
    Group(Vec<CommandSpec>),
}

impl CommandSpec {
    pub fn line(line: impl Into<String>) -> Self {
        CommandSpec::Line(line.into())
    }

    pub fn group(commands: impl IntoIterator<Item = CommandSpec>) -> Self {
        CommandSpec::Group(commands.into_iter().collect())
    }

    /// Invocation of `program` with arguments quoted for the shell
    pub fn exec<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = quote(program);
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg.as_ref()));
        }
        CommandSpec::Line(line)
    }

    /// `mkdir -p <dir>`
    pub fn mkdir(dir: &str) -> Self {
        Self::exec("mkdir", ["-p", dir])
    }

    /// `cp <src> <dst>`
    pub fn copy(src: &str, dst: &str) -> Self {
        Self::exec("cp", [src, dst])
    }

    /// `java -Xmx<heap> -jar <jar> <args...>`
    pub fn java_jar<I, S>(heap: &str, jar: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all = vec![format!("-Xmx{}", heap), "-jar".to_string(), jar.to_string()];
        all.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        Self::exec("java", all)
    }

    /// Render to a single shell line
    ///
    /// Groups become `set -e; cmd1; cmd2; ...` with nested groups flattened
    /// in declaration order.
    pub fn render(&self) -> String {
        match self {
            CommandSpec::Line(line) => line.clone(),
            CommandSpec::Group(_) => {
                let mut rendered = String::from("set -e");
                for line in self.lines() {
                    rendered.push_str("; ");
                    rendered.push_str(line);
                }
                rendered
            }
        }
    }

    /// All leaf command lines in execution order
    pub fn lines(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_lines(&mut out);
        out
    }

    fn collect_lines<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            CommandSpec::Line(line) => out.push(line),
            CommandSpec::Group(commands) => {
                for command in commands {
                    command.collect_lines(out);
                }
            }
        }
    }

    /// Apply `f` to every leaf line
    pub fn map_lines(&self, f: &dyn Fn(&str) -> String) -> CommandSpec {
        match self {
            CommandSpec::Line(line) => CommandSpec::Line(f(line)),
            CommandSpec::Group(commands) => {
                CommandSpec::Group(commands.iter().map(|c| c.map_lines(f)).collect())
            }
        }
    }
}

fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// A volume mounted into a cluster container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Volume or host path
    pub source: String,

    /// Path inside the container
    pub target: String,

    #[serde(default)]
    pub read_only: bool,
}

/// Backend-specific execution descriptor attached to a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SchedulerDetail {
    Bash {
        command: CommandSpec,
    },
    Cluster {
        image_name: String,
        image_version: String,
        #[serde(default)]
        mounts: Vec<MountSpec>,
    },
}

impl SchedulerDetail {
    pub fn backend(&self) -> BackendKind {
        match self {
            SchedulerDetail::Bash { .. } => BackendKind::Bash,
            SchedulerDetail::Cluster { .. } => BackendKind::Cluster,
        }
    }
}

/// A named unit of work in a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Unique stage name
    pub name: String,

    /// Resources consumed by this stage
    pub inputs: Vec<Resource>,

    /// Resources produced by this stage
    pub outputs: Vec<Resource>,

    /// At most one descriptor per backend
    details: Vec<SchedulerDetail>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn with_input(mut self, resource: Resource) -> Self {
        if !self.inputs.contains(&resource) {
            self.inputs.push(resource);
        }
        self
    }

    pub fn with_output(mut self, resource: Resource) -> Self {
        if !self.outputs.contains(&resource) {
            self.outputs.push(resource);
        }
        self
    }

    /// Attach a descriptor, replacing any existing one for the same backend
    pub fn with_detail(mut self, detail: SchedulerDetail) -> Self {
        self.details.retain(|d| d.backend() != detail.backend());
        self.details.push(detail);
        self
    }

    /// Shorthand for a bash descriptor
    pub fn with_bash(self, command: CommandSpec) -> Self {
        self.with_detail(SchedulerDetail::Bash { command })
    }

    pub fn details(&self) -> &[SchedulerDetail] {
        &self.details
    }

    /// Descriptor for the given backend, if the stage supports it
    pub fn detail_for(&self, backend: BackendKind) -> Option<&SchedulerDetail> {
        self.details.iter().find(|d| d.backend() == backend)
    }

    pub fn supports(&self, backend: BackendKind) -> bool {
        self.detail_for(backend).is_some()
    }
}
