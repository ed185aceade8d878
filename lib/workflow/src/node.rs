//! Workflow node types and configurations.
//!
//! Nodes are the steps of a workflow graph. On the wire a node is
//! `{id, type, data: {label, config}}`; at the boundary the type tag and
//! config payload are parsed into the closed [`NodeKind`] enum so the engine
//! dispatches exhaustively. An unknown type tag parses into
//! [`NodeKind::Unrecognized`] rather than failing, which the engine treats
//! as a forward-compatible no-op.

use crate::condition::Condition;
use caseflow_task::{FormSchema, TaskPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A node identifier, unique within one definition.
///
/// Node ids are assigned by the authoring tool and are opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Configuration for `form` and `task` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanTaskConfig {
    /// Who the work goes to; accepts a string, an array, or structured
    /// records (normalized by [`crate::assignee::normalize_assignees`]).
    #[serde(default)]
    pub assigned_to: JsonValue,
    /// Identifier of the form to render.
    #[serde(default)]
    pub form_id: Option<String>,
    /// Task priority.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Deadline for the work.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Instructions shown to the assignee.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Form fields, including per-field editor restrictions.
    #[serde(default)]
    pub form_fields: Option<FormSchema>,
}

/// How a multi-approver node aggregates its approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// One approver at a time, in list order.
    #[default]
    Sequential,
    /// All approvers at once.
    Parallel,
}

/// Configuration for `approval` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalConfig {
    /// The approvers, in the same flexible shapes as `assignedTo`.
    #[serde(default)]
    pub approvers: JsonValue,
    /// Aggregation mode.
    #[serde(default)]
    pub approval_type: ApprovalMode,
    /// Task priority for the spawned approval tasks.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

/// Configuration for `condition` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// The predicate evaluated against instance data.
    pub condition: Condition,
}

/// Configuration for `timer` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Delay in milliseconds.
    pub delay: u64,
}

impl TimerConfig {
    /// Returns the delay as a chrono duration.
    #[must_use]
    pub fn delay_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.delay).unwrap_or(i64::MAX))
    }
}

/// The delivery channel of a notification node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    /// In-app notification.
    Notification,
    /// Email delivery.
    Email,
    /// SMS delivery.
    Sms,
}

impl NotifyChannel {
    /// Returns the wire tag for this channel.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

/// Configuration for `notification`, `email`, and `sms` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyNodeConfig {
    /// The recipients, in the same flexible shapes as `assignedTo`.
    #[serde(default)]
    pub recipients: JsonValue,
    /// Notification headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Notification body.
    #[serde(default)]
    pub message: Option<String>,
}

/// Configuration for `variable` nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Static values merged into instance data.
    #[serde(default)]
    pub variables: Map<String, JsonValue>,
}

/// The behavior of a node, dispatched exhaustively by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The single entry point of the graph.
    Start,
    /// Terminates the instance.
    End,
    /// Merges static values into instance data.
    Variable(VariableConfig),
    /// Creates form tasks and suspends.
    Form(HumanTaskConfig),
    /// Creates plain tasks and suspends.
    Task(HumanTaskConfig),
    /// Creates approval tasks and suspends until aggregation is satisfied.
    Approval(ApprovalConfig),
    /// Routes along the edge labeled with the predicate result.
    Condition(ConditionConfig),
    /// Parks the instance until a persisted due time passes.
    Timer(TimerConfig),
    /// Creates notifications for the configured recipients.
    Notify(NotifyChannel, NotifyNodeConfig),
    /// A type this engine does not know; logged and skipped.
    Unrecognized {
        /// The wire type tag.
        kind: String,
        /// The raw config payload, preserved for round-tripping.
        config: JsonValue,
    },
}

impl NodeKind {
    /// Builds a kind from a wire type tag and config payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error if a *known* type tag carries a malformed
    /// config. Unknown tags never fail.
    pub fn from_parts(kind: &str, config: JsonValue) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            "start" => Self::Start,
            "end" => Self::End,
            "variable" => Self::Variable(serde_json::from_value(config)?),
            "form" => Self::Form(serde_json::from_value(config)?),
            "task" => Self::Task(serde_json::from_value(config)?),
            "approval" => Self::Approval(serde_json::from_value(config)?),
            "condition" => Self::Condition(serde_json::from_value(config)?),
            "timer" => Self::Timer(serde_json::from_value(config)?),
            "notification" => {
                Self::Notify(NotifyChannel::Notification, serde_json::from_value(config)?)
            }
            "email" => Self::Notify(NotifyChannel::Email, serde_json::from_value(config)?),
            "sms" => Self::Notify(NotifyChannel::Sms, serde_json::from_value(config)?),
            other => Self::Unrecognized {
                kind: other.to_string(),
                config,
            },
        })
    }

    /// Returns the wire type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Variable(_) => "variable",
            Self::Form(_) => "form",
            Self::Task(_) => "task",
            Self::Approval(_) => "approval",
            Self::Condition(_) => "condition",
            Self::Timer(_) => "timer",
            Self::Notify(channel, _) => channel.as_str(),
            Self::Unrecognized { kind, .. } => kind,
        }
    }

    /// Returns the config payload as JSON for the wire format.
    #[must_use]
    pub fn config_value(&self) -> JsonValue {
        match self {
            Self::Start | Self::End => JsonValue::Null,
            Self::Variable(c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Form(c) | Self::Task(c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Approval(c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Condition(c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Timer(c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Notify(_, c) => serde_json::to_value(c).unwrap_or(JsonValue::Null),
            Self::Unrecognized { config, .. } => config.clone(),
        }
    }
}

/// Wire representation of a node: `{id, type, data: {label, config}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeWire {
    id: NodeId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: NodeData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeData {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    config: JsonValue,
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeWire", into = "NodeWire")]
pub struct Node {
    /// Unique identifier within the definition.
    pub id: NodeId,
    /// Human-readable label.
    pub label: String,
    /// The node's behavior and configuration.
    pub kind: NodeKind,
}

impl Node {
    /// Creates a new node.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
        }
    }
}

impl TryFrom<NodeWire> for Node {
    type Error = serde_json::Error;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        let kind = NodeKind::from_parts(&wire.kind, wire.data.config)?;
        let label = wire
            .data
            .label
            .unwrap_or_else(|| wire.kind.clone());
        Ok(Self {
            id: wire.id,
            label,
            kind,
        })
    }
}

impl From<Node> for NodeWire {
    fn from(node: Node) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind.type_tag().to_string(),
            data: NodeData {
                label: Some(node.label),
                config: node.kind.config_value(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_form_node_from_wire_format() {
        let wire = json!({
            "id": "node_1",
            "type": "form",
            "data": {
                "label": "Expense form",
                "config": {
                    "assignedTo": "alice",
                    "formId": "expense",
                    "priority": "high",
                    "instructions": "Fill in the amounts"
                }
            }
        });

        let node: Node = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(node.id.as_str(), "node_1");
        assert_eq!(node.label, "Expense form");
        match &node.kind {
            NodeKind::Form(config) => {
                assert_eq!(config.assigned_to, json!("alice"));
                assert_eq!(config.form_id.as_deref(), Some("expense"));
                assert_eq!(config.priority, Some(TaskPriority::High));
            }
            other => panic!("expected Form, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_parses_as_unrecognized() {
        let wire = json!({
            "id": "node_9",
            "type": "webhook",
            "data": {"label": "Call out", "config": {"url": "https://example.test"}}
        });

        let node: Node = serde_json::from_value(wire).expect("deserialize");
        match &node.kind {
            NodeKind::Unrecognized { kind, config } => {
                assert_eq!(kind, "webhook");
                assert_eq!(config["url"], "https://example.test");
            }
            other => panic!("expected Unrecognized, got {other:?}"),
        }
        assert_eq!(node.kind.type_tag(), "webhook");
    }

    #[test]
    fn malformed_known_config_is_an_error() {
        let wire = json!({
            "id": "node_3",
            "type": "timer",
            "data": {"config": {"delay": "soon"}}
        });

        let result: Result<Node, _> = serde_json::from_value(wire);
        assert!(result.is_err());
    }

    #[test]
    fn missing_label_falls_back_to_type_tag() {
        let wire = json!({"id": "node_0", "type": "start"});
        let node: Node = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(node.label, "start");
    }

    #[test]
    fn node_wire_roundtrip() {
        let node = Node::new(
            "node_5",
            "Wait a day",
            NodeKind::Timer(TimerConfig { delay: 86_400_000 }),
        );

        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["type"], "timer");
        assert_eq!(json["data"]["config"]["delay"], 86_400_000u64);

        let parsed: Node = serde_json::from_value(json).expect("deserialize");
        assert_eq!(node, parsed);
    }

    #[test]
    fn approval_mode_defaults_to_sequential() {
        let config: ApprovalConfig =
            serde_json::from_value(json!({"approvers": ["u1", "u2"]})).expect("deserialize");
        assert_eq!(config.approval_type, ApprovalMode::Sequential);
    }

    #[test]
    fn email_and_sms_share_notify_config() {
        for tag in ["notification", "email", "sms"] {
            let kind = NodeKind::from_parts(
                tag,
                json!({"recipients": ["alice"], "title": "Hi", "message": "There"}),
            )
            .expect("parse");
            match kind {
                NodeKind::Notify(channel, config) => {
                    assert_eq!(channel.as_str(), tag);
                    assert_eq!(config.title.as_deref(), Some("Hi"));
                }
                other => panic!("expected Notify, got {other:?}"),
            }
        }
    }
}
