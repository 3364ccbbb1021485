//! Resource domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of artifact a resource represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A file on the shared filesystem
    #[default]
    File,
    /// A scalar parameter value
    Parameter,
}

/// A named artifact flowing between stages
///
/// Resources are identified by name: two resources with the same name are
/// the same vertex in the execution graph, whatever their location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique name within a pipeline
    pub name: String,

    /// File or parameter
    #[serde(default)]
    pub kind: ResourceKind,

    /// Where the resource lives, if known at declaration time
    #[serde(default)]
    pub location: Option<String>,
}

impl Resource {
    /// A file whose location is only known once its producer has run
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::File,
            location: None,
        }
    }

    /// A file with a fixed location
    pub fn file_at(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::File,
            location: Some(location.into()),
        }
    }

    /// A parameter carrying its value as location
    pub fn parameter(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Parameter,
            location: Some(value.into()),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
