use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{InvalidValue, ModelError};

/// Schema URL written into newly constructed architectures.
pub const CALM_SCHEMA: &str = "https://calm.finos.org/release/1.0/meta/calm.json";

/// Free-form key/value metadata. Ordered so renders are deterministic.
pub type Metadata = BTreeMap<String, Value>;

/// Controls keyed by control id.
pub type Controls = BTreeMap<String, Control>;

// --- Types ---

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Actor,
    #[default]
    Service,
    Database,
    System,
    Queue,
    #[serde(rename = "webclient", alias = "web-client")]
    WebClient,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Actor,
        NodeType::Service,
        NodeType::Database,
        NodeType::System,
        NodeType::Queue,
        NodeType::WebClient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Actor => "actor",
            NodeType::Service => "service",
            NodeType::Database => "database",
            NodeType::System => "system",
            NodeType::Queue => "queue",
            NodeType::WebClient => "webclient",
        }
    }

    /// Variant name as written in Rust source, e.g. `WebClient`.
    pub fn variant_name(&self) -> &'static str {
        match self {
            NodeType::Actor => "Actor",
            NodeType::Service => "Service",
            NodeType::Database => "Database",
            NodeType::System => "System",
            NodeType::Queue => "Queue",
            NodeType::WebClient => "WebClient",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actor" => Ok(NodeType::Actor),
            "service" => Ok(NodeType::Service),
            "database" => Ok(NodeType::Database),
            "system" => Ok(NodeType::System),
            "queue" => Ok(NodeType::Queue),
            "webclient" | "web-client" => Ok(NodeType::WebClient),
            _ => Err(InvalidValue::new(
                "node type",
                s,
                "actor, service, database, system, queue, webclient",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    #[serde(rename = "requirement-url")]
    pub requirement_url: String,
    #[serde(flatten)]
    pub source: RequirementConfig,
}

/// Where a requirement's configuration lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequirementConfig {
    Inline {
        config: Value,
    },
    Document {
        #[serde(rename = "config-url")]
        config_url: String,
    },
}

impl Default for RequirementConfig {
    fn default() -> Self {
        RequirementConfig::Inline {
            config: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Control {
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Interface {
    #[serde(rename = "unique-id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Node {
    #[serde(rename = "unique-id")]
    pub id: String,
    #[serde(rename = "node-type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(rename = "costCenter", default, skip_serializing_if = "String::is_empty")]
    pub cost_center: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controls: Controls,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
}

/// One side of a `connects` relationship.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeInterface {
    pub node: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
}

impl NodeInterface {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interfaces: Vec::new(),
        }
    }
}

/// Exactly one relationship variant; the enum makes any other state unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    Connects {
        source: NodeInterface,
        destination: NodeInterface,
    },
    Interacts {
        actor: String,
        #[serde(default)]
        nodes: Vec<String>,
    },
    ComposedOf {
        container: String,
        #[serde(default)]
        nodes: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    #[serde(rename = "unique-id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "dataClassification", default, skip_serializing_if = "String::is_empty")]
    pub data_classification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(rename = "relationship-type")]
    pub kind: RelationshipType,
}

impl Relationship {
    pub fn new(id: impl Into<String>, description: impl Into<String>, kind: RelationshipType) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            data_classification: String::new(),
            encrypted: None,
            protocol: String::new(),
            metadata: Metadata::new(),
            kind,
        }
    }

    /// Every node id this relationship refers to, in declaration order.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        match &self.kind {
            RelationshipType::Connects {
                source,
                destination,
            } => vec![source.node.as_str(), destination.node.as_str()],
            RelationshipType::Interacts { actor, nodes } => std::iter::once(actor.as_str())
                .chain(nodes.iter().map(String::as_str))
                .collect(),
            RelationshipType::ComposedOf { container, nodes } => {
                std::iter::once(container.as_str())
                    .chain(nodes.iter().map(String::as_str))
                    .collect()
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RelationshipType::Connects { .. } => "connects",
            RelationshipType::Interacts { .. } => "interacts",
            RelationshipType::ComposedOf { .. } => "composed-of",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionDirection {
    #[default]
    SourceToDestination,
    DestinationToSource,
}

impl TransitionDirection {
    pub fn variant_name(&self) -> &'static str {
        match self {
            TransitionDirection::SourceToDestination => "SourceToDestination",
            TransitionDirection::DestinationToSource => "DestinationToSource",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    #[serde(rename = "relationship-unique-id")]
    pub relationship_id: String,
    #[serde(rename = "sequence-number")]
    pub sequence_number: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub direction: TransitionDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    #[serde(rename = "unique-id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// The root aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Architecture {
    #[serde(rename = "$schema", default, skip_serializing_if = "String::is_empty")]
    pub schema: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adrs: Vec<String>,
    #[serde(rename = "unique-id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controls: Controls,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Architecture {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.id == id)
    }

    pub fn flow(&self, id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Decode the structural (JSON) form.
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        serde_json::from_str(raw).map_err(ModelError::Decode)
    }

    /// Encode the structural (JSON) form, indented.
    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(ModelError::Encode)
    }
}
