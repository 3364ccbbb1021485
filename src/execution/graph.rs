//! Execution graph - producer/consumer relationships between stages and resources

use crate::core::Pipeline;
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// A vertex of the execution graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vertex {
    Resource(String),
    Stage(String),
}

impl Vertex {
    pub fn name(&self) -> &str {
        match self {
            Vertex::Resource(name) | Vertex::Stage(name) => name,
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Edge direction: resource → stage or stage → resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Consumes,
    Produces,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Consumes => f.write_str("consumes"),
            Dependency::Produces => f.write_str("produces"),
        }
    }
}

/// A single reason a pipeline cannot run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cycle detected between stages: {}", .stages.join(", "))]
    Cycle { stages: Vec<String> },

    #[error("stage '{stage}' consumes '{resource}', which no stage produces and is not a pipeline input")]
    UnresolvedInput { stage: String, resource: String },

    #[error("resource '{resource}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        resource: String,
        first: String,
        second: String,
    },

    #[error("duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("pipeline output '{0}' is not produced by any stage")]
    UnproducedOutput(String),
}

/// Every validation failure found while building a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pipeline validation failed:{}", render_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn render_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| format!("\n  - {}", e)).collect()
}

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stages left over after ordering, i.e. caught in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cycle detected among stages: {}", .stages.join(", "))]
pub struct CycleError {
    pub stages: Vec<String>,
}

/// Directed graph over resources and stages built from a [`Pipeline`]
///
/// Edges run `resource → stage` for every input and `stage → resource` for
/// every output. Stage-to-stage dependencies are derived through the
/// resources in between.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    name: String,
    graph: DiGraph<Vertex, Dependency>,
    resources: HashMap<String, NodeIndex>,
    /// Stage names in declaration order
    stages: Vec<String>,
    stage_nodes: Vec<NodeIndex>,
    upstream: Vec<Vec<usize>>,
    downstream: Vec<Vec<usize>>,
}

impl ExecutionGraph {
    /// Build and validate the graph for a pipeline
    ///
    /// All validation failures are collected; the graph is only returned
    /// when there are none.
    pub fn build(pipeline: &Pipeline) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();
        let mut eg = ExecutionGraph {
            name: pipeline.name.clone(),
            graph: DiGraph::new(),
            resources: HashMap::new(),
            stages: Vec::new(),
            stage_nodes: Vec::new(),
            upstream: Vec::new(),
            downstream: Vec::new(),
        };

        for resource in pipeline.external_inputs.iter().chain(&pipeline.external_outputs) {
            eg.add_resource(&resource.name);
        }

        let mut declared = Vec::new();
        for stage in &pipeline.stages {
            if eg.stages.contains(&stage.name) {
                errors.push(ValidationError::DuplicateStage(stage.name.clone()));
                continue;
            }
            let node = eg.graph.add_node(Vertex::Stage(stage.name.clone()));
            eg.stages.push(stage.name.clone());
            eg.stage_nodes.push(node);
            declared.push(stage);
        }

        let mut producers: HashMap<&str, &str> = HashMap::new();
        for (idx, stage) in declared.iter().enumerate() {
            let stage_node = eg.stage_nodes[idx];
            for input in &stage.inputs {
                let node = eg.add_resource(&input.name);
                eg.graph.update_edge(node, stage_node, Dependency::Consumes);
            }
            for output in &stage.outputs {
                let node = eg.add_resource(&output.name);
                eg.graph.update_edge(stage_node, node, Dependency::Produces);
                match producers.get(output.name.as_str()) {
                    Some(first) if *first != stage.name => {
                        errors.push(ValidationError::DuplicateProducer {
                            resource: output.name.clone(),
                            first: first.to_string(),
                            second: stage.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        producers.insert(&output.name, &stage.name);
                    }
                }
            }
        }

        for stage in &declared {
            for input in &stage.inputs {
                if !producers.contains_key(input.name.as_str()) && !pipeline.is_external_input(input) {
                    errors.push(ValidationError::UnresolvedInput {
                        stage: stage.name.clone(),
                        resource: input.name.clone(),
                    });
                }
            }
        }

        for output in &pipeline.external_outputs {
            if !producers.contains_key(output.name.as_str()) && !pipeline.is_external_input(output) {
                errors.push(ValidationError::UnproducedOutput(output.name.clone()));
            }
        }

        for component in tarjan_scc(&eg.graph) {
            if component.len() < 2 {
                continue;
            }
            let mut members: Vec<usize> = component
                .iter()
                .filter_map(|node| eg.stage_nodes.iter().position(|n| n == node))
                .collect();
            members.sort_unstable();
            errors.push(ValidationError::Cycle {
                stages: members.into_iter().map(|i| eg.stages[i].clone()).collect(),
            });
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        eg.link_stages();
        Ok(eg)
    }

    fn add_resource(&mut self, name: &str) -> NodeIndex {
        if let Some(node) = self.resources.get(name) {
            return *node;
        }
        let node = self.graph.add_node(Vertex::Resource(name.to_string()));
        self.resources.insert(name.to_string(), node);
        node
    }

    /// Derive stage-to-stage edges through the resources between them
    fn link_stages(&mut self) {
        let position: HashMap<NodeIndex, usize> = self
            .stage_nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i))
            .collect();

        let mut upstream = vec![BTreeSet::new(); self.stages.len()];
        let mut downstream = vec![BTreeSet::new(); self.stages.len()];
        for (consumer, node) in self.stage_nodes.iter().enumerate() {
            for resource in self.graph.neighbors_directed(*node, Direction::Incoming) {
                for producer in self.graph.neighbors_directed(resource, Direction::Incoming) {
                    if let Some(&p) = position.get(&producer) {
                        upstream[consumer].insert(p);
                        downstream[p].insert(consumer);
                    }
                }
            }
        }

        self.upstream = upstream.into_iter().map(|s| s.into_iter().collect()).collect();
        self.downstream = downstream.into_iter().map(|s| s.into_iter().collect()).collect();
    }

    /// Pipeline name the graph was built from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in declaration order
    pub fn stage_names(&self) -> &[String] {
        &self.stages
    }

    /// Declaration index of a stage
    pub fn stage_position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == name)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Declaration indices of the stages producing this stage's inputs
    pub fn producers(&self, stage: usize) -> &[usize] {
        &self.upstream[stage]
    }

    /// Declaration indices of the stages consuming this stage's outputs
    pub fn consumers(&self, stage: usize) -> &[usize] {
        &self.downstream[stage]
    }

    /// Names of the stages producing this stage's inputs
    pub fn producers_of(&self, name: &str) -> Vec<&str> {
        self.stage_position(name)
            .map(|i| self.upstream[i].iter().map(|p| self.stages[*p].as_str()).collect())
            .unwrap_or_default()
    }

    /// All stages reachable downstream from `stage`, in declaration order
    pub fn descendants(&self, stage: usize) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = self.downstream[stage].clone();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.downstream[next].iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    /// Kahn's algorithm over stages; ready stages are taken in declaration order
    pub fn topological_indices(&self) -> Result<Vec<usize>, CycleError> {
        let mut indegree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.stages.len()).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &consumer in &self.downstream[next] {
                indegree[consumer] -= 1;
                if indegree[consumer] == 0 {
                    ready.insert(consumer);
                }
            }
        }

        if order.len() < self.stages.len() {
            let stages = (0..self.stages.len())
                .filter(|i| indegree[*i] > 0)
                .map(|i| self.stages[i].clone())
                .collect();
            return Err(CycleError { stages });
        }

        Ok(order)
    }

    /// Stage names in execution order
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|i| self.stages[i].clone())
            .collect())
    }

    /// Graphviz rendering: stages as boxes, resources as notes
    pub fn to_dot(&self) -> String {
        format!(
            "{}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::EdgeNoLabel],
                &|_, _| String::new(),
                &|_, (_, vertex)| match vertex {
                    Vertex::Stage(_) => "shape = box ".to_string(),
                    Vertex::Resource(_) => "shape = note ".to_string(),
                },
            )
        )
    }
}
