//! Edge types for workflow graphs.
//!
//! An edge connects a source node to a target node. An optional label is
//! used for conditional routing: a condition node follows the edge whose
//! label equals the predicate result, falling back to an edge labeled
//! `default`.

use serde::{Deserialize, Serialize};

/// An edge in a workflow graph.
///
/// Source and target node ids live in the graph structure; the edge weight
/// carries identity and routing label only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier within the definition.
    pub id: String,
    /// Routing label, if any.
    #[serde(default)]
    pub label: Option<String>,
}

impl Edge {
    /// Creates an unlabeled edge.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    /// Creates a labeled edge.
    #[must_use]
    pub fn labeled(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
        }
    }

    /// Returns true if this edge matches the routing label.
    #[must_use]
    pub fn matches_label(&self, label: &str) -> bool {
        self.label.as_deref() == Some(label)
    }
}
