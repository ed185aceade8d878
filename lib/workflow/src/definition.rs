//! Workflow definition types.
//!
//! A definition is a named, versioned process template: metadata plus a
//! directed graph of nodes. Once published it is immutable; instances
//! reference it by id and the engine only ever reads it.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use caseflow_core::{DefinitionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access-control lists attached to a definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessControl {
    /// Users who may edit the definition.
    #[serde(default)]
    pub editors: Vec<UserId>,
    /// Users who may view it; empty means anyone.
    #[serde(default)]
    pub viewers: Vec<UserId>,
}

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionMetadata {
    /// Human-readable name.
    pub name: String,
    /// Description of what this process does.
    pub description: Option<String>,
    /// Semantic version of this definition.
    pub version: String,
    /// Whether instances may be started from this definition.
    pub active: bool,
    /// Who created the definition.
    pub created_by: Option<UserId>,
    /// Access-control lists.
    pub acl: AccessControl,
    /// When this definition was created.
    pub created_at: DateTime<Utc>,
    /// When this definition was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DefinitionMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            version: "0.1.0".to_string(),
            active: true,
            created_by: None,
            acl: AccessControl::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the creator.
    #[must_use]
    pub fn with_creator(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier.
    pub id: DefinitionId,
    /// Definition metadata.
    pub metadata: DefinitionMetadata,
    /// The workflow graph (nodes and edges).
    pub graph: WorkflowGraph,
}

impl WorkflowDefinition {
    /// Creates a new definition with the given name and an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DefinitionId::new(),
            metadata: DefinitionMetadata::new(name),
            graph: WorkflowGraph::new(),
        }
    }

    /// Returns the definition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns whether instances may be started.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.metadata.active
    }

    /// Activates the definition.
    pub fn activate(&mut self) {
        self.metadata.active = true;
        self.touch();
    }

    /// Deactivates the definition.
    pub fn deactivate(&mut self) {
        self.metadata.active = false;
        self.touch();
    }

    /// Returns true if the user may edit the definition.
    #[must_use]
    pub fn can_edit(&self, user: &UserId) -> bool {
        self.metadata.created_by.as_ref() == Some(user)
            || self.metadata.acl.editors.contains(user)
    }

    /// Returns true if the user may view the definition.
    #[must_use]
    pub fn can_view(&self, user: &UserId) -> bool {
        self.can_edit(user)
            || self.metadata.acl.viewers.is_empty()
            || self.metadata.acl.viewers.contains(user)
    }

    /// Validates the workflow graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is structurally invalid.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// Bumps the updated timestamp.
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

/// Summary information about a definition (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSummary {
    /// Definition ID.
    pub id: DefinitionId,
    /// Name.
    pub name: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Whether active.
    pub active: bool,
    /// Number of nodes in the graph.
    pub node_count: usize,
    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowDefinition> for DefinitionSummary {
    fn from(definition: &WorkflowDefinition) -> Self {
        Self {
            id: definition.id,
            name: definition.metadata.name.clone(),
            description: definition.metadata.description.clone(),
            active: definition.metadata.active,
            node_count: definition.graph.node_count(),
            updated_at: definition.metadata.updated_at,
        }
    }
}
