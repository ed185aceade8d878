//! Workflow graph implementation using petgraph.
//!
//! The graph is stored on the wire as `{nodes: [...], edges: [...]}` per the
//! definition payload format and held in memory as a petgraph `DiGraph` with
//! a `NodeId → NodeIndex` map for O(1) lookup.
//!
//! Edge selection preserves declaration order: when several outgoing edges
//! match, the first one declared wins.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{Node, NodeId, NodeKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A directed workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }

    /// Adds a node to the graph.
    ///
    /// Returns the node ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id.clone(), index);
        node_id
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds an edge between two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint does not exist.
    pub fn add_edge(
        &mut self,
        source_id: &NodeId,
        target_id: &NodeId,
        edge: Edge,
    ) -> Result<(), GraphError> {
        let source_index = self.node_index_map.get(source_id).ok_or_else(|| {
            GraphError::NodeNotFound {
                node_id: source_id.clone(),
            }
        })?;
        let target_index = self.node_index_map.get(target_id).ok_or_else(|| {
            GraphError::NodeNotFound {
                node_id: target_id.clone(),
            }
        })?;

        self.graph.add_edge(*source_index, *target_index, edge);
        Ok(())
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the graph's single start node, if it has one.
    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes().find(|n| matches!(n.kind, NodeKind::Start))
    }

    /// Returns the successors of a node in edge-declaration order.
    pub fn successors(&self, node_id: &NodeId) -> Vec<(&Node, &Edge)> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        // petgraph iterates outgoing edges most-recently-added first; sort
        // by edge index to restore declaration order.
        let mut edges: Vec<_> = self.graph.edges_directed(index, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id());

        edges
            .into_iter()
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some((target, edge.weight()))
            })
            .collect()
    }

    /// Returns the first successor in declaration order, regardless of label.
    ///
    /// This is the plain-advance rule: first matching edge wins.
    #[must_use]
    pub fn next_after(&self, node_id: &NodeId) -> Option<&Node> {
        self.successors(node_id).first().map(|(node, _)| *node)
    }

    /// Returns the first successor along an edge with the given label.
    #[must_use]
    pub fn next_labeled(&self, node_id: &NodeId, label: &str) -> Option<&Node> {
        self.successors(node_id)
            .iter()
            .find(|(_, edge)| edge.matches_label(label))
            .map(|(node, _)| *node)
    }

    /// Validates the graph.
    ///
    /// Checks that exactly one node has the start type. A non-terminal node
    /// without outgoing edges is allowed: the engine treats it as implicit
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns an error describing the validation failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        let start_count = self
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Start))
            .count();
        match start_count {
            0 => Err(GraphError::NoStartNode),
            1 => Ok(()),
            _ => Err(GraphError::MultipleStartNodes),
        }
    }

    /// Rebuilds the node index map after structural changes.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id.clone(), index);
            }
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for WorkflowGraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        graph_serde::serialize(&self.graph, serializer)
    }
}

impl<'de> Deserialize<'de> for WorkflowGraph {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let graph = graph_serde::deserialize(deserializer)?;
        let mut workflow_graph = Self {
            graph,
            node_index_map: HashMap::new(),
        };
        workflow_graph.rebuild_index_map();
        Ok(workflow_graph)
    }
}

/// Custom serde translating between petgraph and the wire format:
/// `{nodes: [{id, type, data}], edges: [{id, source, target, label?}]}`.
mod graph_serde {
    use super::*;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    /// Wire representation of an edge with its endpoints.
    #[derive(Serialize, Deserialize)]
    struct EdgeWire {
        id: String,
        source: NodeId,
        target: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    }

    pub fn serialize<S>(graph: &DiGraph<Node, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<_> = graph.node_weights().cloned().collect();

        let mut edge_refs: Vec<_> = graph.edge_references().collect();
        edge_refs.sort_by_key(|e| e.id());
        let edges: Vec<EdgeWire> = edge_refs
            .into_iter()
            .filter_map(|e| {
                let source = graph.node_weight(e.source())?.id.clone();
                let target = graph.node_weight(e.target())?.id.clone();
                Some(EdgeWire {
                    id: e.weight().id.clone(),
                    source,
                    target,
                    label: e.weight().label.clone(),
                })
            })
            .collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Node, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Node, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a workflow graph with nodes and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut edges: Option<Vec<EdgeWire>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let nodes = nodes.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for node in nodes {
                    let id = node.id.clone();
                    let index = graph.add_node(node);
                    id_to_index.insert(id, index);
                }

                // Edges land in declaration order, which edge indices
                // preserve.
                for wire in edges {
                    let (Some(&source), Some(&target)) =
                        (id_to_index.get(&wire.source), id_to_index.get(&wire.target))
                    else {
                        continue;
                    };
                    graph.add_edge(
                        source,
                        target,
                        Edge {
                            id: wire.id,
                            label: wire.label,
                        },
                    );
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["nodes", "edges"], GraphVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use serde_json::json;

    fn start_node(id: &str) -> Node {
        Node::new(id, "Start", NodeKind::Start)
    }

    fn end_node(id: &str) -> Node {
        Node::new(id, "End", NodeKind::End)
    }

    #[test]
    fn add_and_get_node() {
        let mut graph = WorkflowGraph::new();
        let id = graph.add_node(start_node("node_1"));

        let retrieved = graph.get_node(&id);
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().label, "Start");
    }

    #[test]
    fn add_edge_rejects_missing_endpoint() {
        let mut graph = WorkflowGraph::new();
        let start = graph.add_node(start_node("node_1"));

        let result = graph.add_edge(&start, &NodeId::new("ghost"), Edge::new("edge_1"));
        assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn successors_preserve_declaration_order() {
        let mut graph = WorkflowGraph::new();
        let start = graph.add_node(start_node("node_1"));
        let first = graph.add_node(end_node("node_2"));
        let second = graph.add_node(end_node("node_3"));

        graph.add_edge(&start, &first, Edge::new("edge_1")).unwrap();
        graph.add_edge(&start, &second, Edge::new("edge_2")).unwrap();

        let successors = graph.successors(&start);
        assert_eq!(successors.len(), 2);
        assert_eq!(successors[0].0.id, first);
        assert_eq!(successors[1].0.id, second);

        // First-match-wins for plain advance.
        assert_eq!(graph.next_after(&start).unwrap().id, first);
    }

    #[test]
    fn labeled_selection_ignores_other_labels() {
        let mut graph = WorkflowGraph::new();
        let start = graph.add_node(start_node("node_1"));
        let yes = graph.add_node(end_node("node_yes"));
        let no = graph.add_node(end_node("node_no"));

        graph
            .add_edge(&start, &yes, Edge::labeled("edge_1", "true"))
            .unwrap();
        graph
            .add_edge(&start, &no, Edge::labeled("edge_2", "false"))
            .unwrap();

        assert_eq!(graph.next_labeled(&start, "false").unwrap().id, no);
        assert_eq!(graph.next_labeled(&start, "true").unwrap().id, yes);
        assert!(graph.next_labeled(&start, "default").is_none());
    }

    #[test]
    fn validate_requires_exactly_one_start() {
        let mut graph = WorkflowGraph::new();
        assert!(matches!(graph.validate(), Err(GraphError::NoStartNode)));

        graph.add_node(start_node("node_1"));
        assert!(graph.validate().is_ok());

        graph.add_node(start_node("node_2"));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::MultipleStartNodes)
        ));
    }

    #[test]
    fn graph_parses_wire_format() {
        let wire = json!({
            "nodes": [
                {"id": "node_1", "type": "start", "data": {"label": "Start"}},
                {"id": "node_2", "type": "end", "data": {"label": "End"}}
            ],
            "edges": [
                {"id": "edge_1", "source": "node_1", "target": "node_2"}
            ]
        });

        let graph: WorkflowGraph = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        // The index map is rebuilt during deserialization.
        let start = graph.start_node().expect("start node");
        assert_eq!(graph.next_after(&start.id).unwrap().id.as_str(), "node_2");
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut graph = WorkflowGraph::new();
        let start = graph.add_node(start_node("node_1"));
        let end = graph.add_node(end_node("node_2"));
        graph
            .add_edge(&start, &end, Edge::labeled("edge_1", "default"))
            .unwrap();

        let json = serde_json::to_value(&graph).expect("serialize");
        assert_eq!(json["edges"][0]["source"], "node_1");
        assert_eq!(json["edges"][0]["label"], "default");

        let parsed: WorkflowGraph = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.node_count(), 2);
        assert_eq!(parsed.next_labeled(&start, "default").unwrap().id, end);
    }
}
