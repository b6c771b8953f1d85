//! Construction DSL.
//!
//! Model-building code reads as an ordered list of calls on an
//! [`Architecture`]. Relationships are always registered through the
//! architecture itself, so nodes never hold a reference back to it.
//!
//! ```
//! use archsync_core::prelude::*;
//!
//! let mut arch = Architecture::new("shop", "Shop", "Order processing");
//! arch.define_node("api", NodeType::Service, "API", "Public API")
//!     .with_owner("platform-team")
//!     .with_meta("health-endpoint", json!("/health"));
//! arch.define_node("db", NodeType::Database, "Orders DB", "Order store");
//! arch.connect("api-db", "Stores orders", "api", "db")
//!     .with_protocol("JDBC");
//! assert_eq!(arch.relationships.len(), 1);
//! ```

use serde_json::Value;

use crate::model::{
    Architecture, Control, Flow, Interface, Node, NodeInterface, NodeType, Relationship,
    RelationshipType, Requirement, RequirementConfig, Transition, TransitionDirection, CALM_SCHEMA,
};

impl Architecture {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            schema: CALM_SCHEMA.to_string(),
            id: id.into(),
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn add_adr(&mut self, url: impl Into<String>) -> &mut Self {
        self.adrs.push(url.into());
        self
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn define_control(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        requirements: Vec<Requirement>,
    ) -> &mut Self {
        self.controls.insert(
            id.into(),
            Control {
                description: description.into(),
                requirements,
            },
        );
        self
    }

    /// Append a node and hand back a handle for chaining options.
    pub fn define_node(
        &mut self,
        id: impl Into<String>,
        node_type: NodeType,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Node {
        let index = self.nodes.len();
        self.nodes.push(Node {
            id: id.into(),
            node_type,
            name: name.into(),
            description: description.into(),
            ..Default::default()
        });
        &mut self.nodes[index]
    }

    pub fn add_relationship(&mut self, relationship: Relationship) -> &mut Relationship {
        let index = self.relationships.len();
        self.relationships.push(relationship);
        &mut self.relationships[index]
    }

    pub fn connect(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> &mut Relationship {
        self.add_relationship(Relationship::new(
            id,
            description,
            RelationshipType::Connects {
                source: NodeInterface::new(source),
                destination: NodeInterface::new(destination),
            },
        ))
    }

    pub fn interacts(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        actor: impl Into<String>,
        targets: &[&str],
    ) -> &mut Relationship {
        self.add_relationship(Relationship::new(
            id,
            description,
            RelationshipType::Interacts {
                actor: actor.into(),
                nodes: targets.iter().map(|t| t.to_string()).collect(),
            },
        ))
    }

    pub fn composed_of(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        container: impl Into<String>,
        members: &[&str],
    ) -> &mut Relationship {
        self.add_relationship(Relationship::new(
            id,
            description,
            RelationshipType::ComposedOf {
                container: container.into(),
                nodes: members.iter().map(|m| m.to_string()).collect(),
            },
        ))
    }

    pub fn define_flow(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Flow {
        let index = self.flows.len();
        self.flows.push(Flow {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            ..Default::default()
        });
        &mut self.flows[index]
    }
}

impl Node {
    pub fn with_owner(&mut self, owner: impl Into<String>) -> &mut Self {
        self.owner = owner.into();
        self
    }

    pub fn with_cost_center(&mut self, cost_center: impl Into<String>) -> &mut Self {
        self.cost_center = cost_center.into();
        self
    }

    pub fn with_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_interface(&mut self, interface: Interface) -> &mut Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_control(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        requirements: Vec<Requirement>,
    ) -> &mut Self {
        self.controls.insert(
            id.into(),
            Control {
                description: description.into(),
                requirements,
            },
        );
        self
    }
}

impl Interface {
    pub fn new(id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_port(mut self, port: u32) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl Relationship {
    pub fn with_protocol(&mut self, protocol: impl Into<String>) -> &mut Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_classification(&mut self, classification: impl Into<String>) -> &mut Self {
        self.data_classification = classification.into();
        self
    }

    pub fn with_encryption(&mut self, encrypted: bool) -> &mut Self {
        self.encrypted = Some(encrypted);
        self
    }

    pub fn with_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// No-op for anything but `connects`.
    pub fn with_source_interfaces(&mut self, interfaces: &[&str]) -> &mut Self {
        if let RelationshipType::Connects { source, .. } = &mut self.kind {
            source.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        }
        self
    }

    /// No-op for anything but `connects`.
    pub fn with_destination_interfaces(&mut self, interfaces: &[&str]) -> &mut Self {
        if let RelationshipType::Connects { destination, .. } = &mut self.kind {
            destination.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        }
        self
    }
}

impl Flow {
    pub fn with_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn step(
        &mut self,
        relationship_id: impl Into<String>,
        sequence_number: u32,
        description: impl Into<String>,
        direction: TransitionDirection,
    ) -> &mut Self {
        self.transitions.push(Transition {
            relationship_id: relationship_id.into(),
            sequence_number,
            description: description.into(),
            direction,
        });
        self
    }
}

impl Requirement {
    pub fn inline(url: impl Into<String>, config: Value) -> Self {
        Self {
            requirement_url: url.into(),
            source: RequirementConfig::Inline { config },
        }
    }

    pub fn document(url: impl Into<String>, config_url: impl Into<String>) -> Self {
        Self {
            requirement_url: url.into(),
            source: RequirementConfig::Document {
                config_url: config_url.into(),
            },
        }
    }
}

/// Caller-supplied construction logic.
pub trait Builder {
    fn build(&self) -> Architecture;
}

impl<F> Builder for F
where
    F: Fn() -> Architecture,
{
    fn build(&self) -> Architecture {
        self()
    }
}
