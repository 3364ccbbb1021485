//! Pipeline configuration from YAML

use crate::core::{
    pipeline::Pipeline,
    resource::Resource,
    stage::{CommandSpec, MountSpec, SchedulerDetail, Stage},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Reference to a resource: a bare name or a full declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceRef {
    Name(String),
    Declared(Resource),
}

impl ResourceRef {
    pub fn name(&self) -> &str {
        match self {
            ResourceRef::Name(name) => name,
            ResourceRef::Declared(resource) => &resource.name,
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Values substituted for `{{ name }}` placeholders
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Resources provided from outside the pipeline
    #[serde(default)]
    pub inputs: Vec<ResourceRef>,

    /// Resources the pipeline delivers
    #[serde(default)]
    pub outputs: Vec<ResourceRef>,

    /// Pipeline stages
    pub stages: Vec<StageConfig>,
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name
    pub name: String,

    /// Optional stage description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: Vec<ResourceRef>,

    #[serde(default)]
    pub outputs: Vec<ResourceRef>,

    /// Local subprocess descriptor
    #[serde(default)]
    pub bash: Option<BashConfig>,

    /// Container descriptor
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
}

/// `bash:` block; a list of commands is run as a fail-fast group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashConfig {
    pub command: CommandSpec,
}

/// `cluster:` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub image: String,
    pub version: String,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks; dependency checks happen when the graph is built
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                anyhow::bail!("Stage with empty name");
            }
            if !seen.insert(&stage.name) {
                anyhow::bail!("Duplicate stage name: {}", stage.name);
            }
            if stage.bash.is_none() && stage.cluster.is_none() {
                anyhow::bail!("Stage '{}' declares no backend (bash or cluster)", stage.name);
            }
            if let Some(bash) = &stage.bash {
                if bash.command.lines().is_empty() {
                    anyhow::bail!("Stage '{}' has an empty bash command", stage.name);
                }
            }
        }

        for resource in self.inputs.iter().chain(&self.outputs) {
            if resource.name().trim().is_empty() {
                anyhow::bail!("Resource with empty name");
            }
        }

        for stage in &self.stages {
            for resource in stage.inputs.iter().chain(&stage.outputs) {
                if resource.name().trim().is_empty() {
                    anyhow::bail!("Stage '{}' references a resource with empty name", stage.name);
                }
            }
        }

        Ok(())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        self.to_pipeline_with(&HashMap::new())
    }

    /// Convert config to a Pipeline, with variable overrides taking precedence
    pub fn to_pipeline_with(&self, overrides: &HashMap<String, String>) -> Pipeline {
        let mut variables = self.variables.clone();
        variables.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        // Declared pipeline resources win over bare references in stages
        let mut declared: HashMap<String, Resource> = HashMap::new();
        for reference in self.inputs.iter().chain(&self.outputs) {
            let resource = resolve(reference, &HashMap::new(), &variables);
            declared.entry(resource.name.clone()).or_insert(resource);
        }

        let mut pipeline = Pipeline::new(render(&self.name, &variables));
        for reference in &self.inputs {
            pipeline = pipeline.with_input(resolve(reference, &declared, &variables));
        }
        for reference in &self.outputs {
            pipeline = pipeline.with_output(resolve(reference, &declared, &variables));
        }

        for stage_config in &self.stages {
            let mut stage = Stage::new(stage_config.name.clone());
            for reference in &stage_config.inputs {
                stage = stage.with_input(resolve(reference, &declared, &variables));
            }
            for reference in &stage_config.outputs {
                stage = stage.with_output(resolve(reference, &declared, &variables));
            }
            if let Some(bash) = &stage_config.bash {
                stage = stage.with_bash(bash.command.map_lines(&|line| render(line, &variables)));
            }
            if let Some(cluster) = &stage_config.cluster {
                stage = stage.with_detail(SchedulerDetail::Cluster {
                    image_name: render(&cluster.image, &variables),
                    image_version: render(&cluster.version, &variables),
                    mounts: cluster
                        .mounts
                        .iter()
                        .map(|m| MountSpec {
                            source: render(&m.source, &variables),
                            target: render(&m.target, &variables),
                            read_only: m.read_only,
                        })
                        .collect(),
                });
            }
            pipeline = pipeline.with_stage(stage);
        }

        pipeline
    }
}

fn resolve(
    reference: &ResourceRef,
    declared: &HashMap<String, Resource>,
    variables: &HashMap<String, String>,
) -> Resource {
    match reference {
        ResourceRef::Name(name) => declared
            .get(name)
            .cloned()
            .unwrap_or_else(|| Resource::file(name.clone())),
        ResourceRef::Declared(resource) => Resource {
            name: resource.name.clone(),
            kind: resource.kind,
            location: resource.location.as_deref().map(|l| render(l, variables)),
        },
    }
}

/// Replace `{{ name }}` placeholders; unknown placeholders are left in place
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}
