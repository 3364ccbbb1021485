//! Pipeline domain model

use crate::core::{resource::Resource, stage::Stage};

/// A statically declared set of stages plus the pipeline's external resources
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Stages in declaration order
    pub stages: Vec<Stage>,

    /// Resources provided from outside the pipeline
    pub external_inputs: Vec<Resource>,

    /// Resources the pipeline promises to deliver
    pub external_outputs: Vec<Resource>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_input(mut self, resource: Resource) -> Self {
        if !self.external_inputs.contains(&resource) {
            self.external_inputs.push(resource);
        }
        self
    }

    pub fn with_output(mut self, resource: Resource) -> Self {
        if !self.external_outputs.contains(&resource) {
            self.external_outputs.push(resource);
        }
        self
    }

    /// Get a stage by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn is_external_input(&self, resource: &Resource) -> bool {
        self.external_inputs.contains(resource)
    }

    /// Stage names in declaration order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}
