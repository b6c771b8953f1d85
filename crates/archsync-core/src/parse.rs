//! Annotated diagram text back into a model.
//!
//! A single forward pass over lines. At most one context (node block, edge
//! block or flow) is open at a time; opening another or reaching a closing
//! brace commits it. Malformed structured values are skipped with a warning
//! rather than failing the whole document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::annotation::{self, key, marker, unescape};
use crate::model::{
    Architecture, Controls, Flow, Interface, Metadata, Node, NodeInterface, NodeType, Relationship,
    RelationshipType, Transition,
};

static NODE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^\s:]+):\s*(.*?)\s*\{\s*$").expect("node pattern compiles")
});

static EDGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^\s:]+)\s*->\s*([^\s:{]+)").expect("edge pattern compiles")
});

/// Rebuild an architecture from annotated diagram text.
pub fn parse_annotated(text: &str) -> Architecture {
    let mut state = ParseState::default();
    for line in text.lines() {
        state.line(line);
    }
    state.finish()
}

#[derive(Default)]
struct PendingNode {
    id: Option<String>,
    seq: Option<usize>,
    node: Node,
}

enum EdgeShape {
    Connects {
        source: NodeInterface,
        destination: NodeInterface,
    },
    Interacts {
        actor: String,
        target: String,
    },
}

struct PendingRelationship {
    id: Option<String>,
    description: String,
    protocol: String,
    classification: String,
    encrypted: Option<bool>,
    metadata: Metadata,
    shape: EdgeShape,
}

impl PendingRelationship {
    fn between(source: &str, destination: &str) -> Self {
        Self {
            id: None,
            description: String::new(),
            protocol: String::new(),
            classification: String::new(),
            encrypted: None,
            metadata: Metadata::new(),
            shape: EdgeShape::Connects {
                source: NodeInterface::new(source),
                destination: NodeInterface::new(destination),
            },
        }
    }

    fn make_interaction(&mut self) {
        if let EdgeShape::Connects {
            source,
            destination,
        } = &mut self.shape
        {
            let actor = std::mem::take(&mut source.node);
            let target = std::mem::take(&mut destination.node);
            self.shape = EdgeShape::Interacts { actor, target };
        }
    }
}

#[derive(Default)]
enum Context {
    #[default]
    Idle,
    Node(PendingNode),
    Relationship(PendingRelationship),
    Flow(Flow),
    /// A block whose header could not be decoded; its fields are dropped.
    Skip,
}

#[derive(Deserialize)]
struct FlowHeader {
    #[serde(rename = "unique-id")]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Default)]
struct ParseState {
    arch: Architecture,
    nodes: Vec<(Option<usize>, Node)>,
    context: Context,
}

impl ParseState {
    fn line(&mut self, line: &str) {
        if let Some((key, value)) = annotation::field(line) {
            self.field(key, value);
        } else if let Some((name, payload)) = annotation::marker(line) {
            self.marker(name, payload);
        } else if let Some(caps) = NODE_START.captures(line) {
            debug!(id = &caps[1], "node block");
            self.open(Context::Node(PendingNode::default()));
        } else if let Some(caps) = EDGE.captures(line) {
            let rel = PendingRelationship::between(last_segment(&caps[1]), last_segment(&caps[2]));
            self.open(Context::Relationship(rel));
        } else if line.trim() == "}" {
            if matches!(self.context, Context::Node(_) | Context::Relationship(_)) {
                self.commit();
            }
        }
    }

    fn open(&mut self, context: Context) {
        self.commit();
        self.context = context;
    }

    /// Commit whatever is open and return to idle.
    fn commit(&mut self) {
        match std::mem::take(&mut self.context) {
            Context::Idle | Context::Skip => {}
            Context::Node(pending) => match pending.id {
                Some(id) => {
                    let mut node = pending.node;
                    node.id = id;
                    self.nodes.push((pending.seq, node));
                }
                // classes and other unannotated blocks
                None => {}
            },
            Context::Relationship(pending) => self.commit_relationship(pending),
            Context::Flow(flow) => self.arch.flows.push(flow),
        }
    }

    fn commit_relationship(&mut self, pending: PendingRelationship) {
        let Some(id) = pending.id else {
            debug!("dropping edge without @calm id");
            return;
        };
        let kind = match pending.shape {
            EdgeShape::Connects {
                source,
                destination,
            } => RelationshipType::Connects {
                source,
                destination,
            },
            EdgeShape::Interacts { actor, target } => {
                // one block per target; consecutive blocks of one relationship merge
                if let Some(last) = self.arch.relationships.last_mut() {
                    if last.id == id {
                        if let RelationshipType::Interacts {
                            actor: last_actor,
                            nodes,
                        } = &mut last.kind
                        {
                            if *last_actor == actor {
                                nodes.push(target);
                                return;
                            }
                        }
                    }
                }
                RelationshipType::Interacts {
                    actor,
                    nodes: vec![target],
                }
            }
        };
        self.arch.relationships.push(Relationship {
            id,
            description: pending.description,
            data_classification: pending.classification,
            encrypted: pending.encrypted,
            protocol: pending.protocol,
            metadata: pending.metadata,
            kind,
        });
    }

    fn field(&mut self, key: &str, value: &str) {
        match &mut self.context {
            Context::Idle => architecture_field(&mut self.arch, key, value),
            Context::Node(pending) => node_field(pending, key, value),
            Context::Relationship(pending) => relationship_field(pending, key, value),
            Context::Flow(flow) => flow_field(flow, key, value),
            Context::Skip => debug!(key, "dropping field of an undecodable block"),
        }
    }

    fn marker(&mut self, name: &str, payload: &str) {
        match name {
            marker::FLOW => match decode::<FlowHeader>(name, payload) {
                Some(header) => self.open(Context::Flow(Flow {
                    id: header.id,
                    name: header.name,
                    ..Default::default()
                })),
                None => self.open(Context::Skip),
            },
            marker::FLOW_STEP => {
                if let Context::Flow(flow) = &mut self.context {
                    if let Some(transition) = decode::<Transition>(name, payload) {
                        flow.transitions.push(transition);
                    }
                } else {
                    debug!("flow-step outside of a flow");
                }
            }
            marker::COMPOSED_OF | marker::RELATIONSHIP => {
                if let Some(rel) = decode::<Relationship>(name, payload) {
                    self.arch.relationships.push(rel);
                }
            }
            marker::CONTROL => {
                if let Some(controls) = decode::<Controls>(name, payload) {
                    self.arch.controls.extend(controls);
                }
            }
            other => debug!(marker = other, "unknown annotation marker"),
        }
    }

    fn finish(mut self) -> Architecture {
        self.commit();
        // stable: nodes sharing a seq keep document order
        self.nodes.sort_by_key(|(seq, _)| seq.unwrap_or(usize::MAX));
        self.arch.nodes = self.nodes.into_iter().map(|(_, node)| node).collect();
        self.arch
    }
}

fn architecture_field(arch: &mut Architecture, key: &str, value: &str) {
    match key {
        key::ID => arch.id = unescape(value),
        key::NAME => arch.name = unescape(value),
        key::DESCRIPTION => arch.description = unescape(value),
        key::SCHEMA => arch.schema = unescape(value),
        key::ADRS => set_decoded(&mut arch.adrs, key, value),
        key::METADATA => set_decoded(&mut arch.metadata, key, value),
        _ => debug!(key, "unknown architecture annotation"),
    }
}

fn node_field(pending: &mut PendingNode, key: &str, value: &str) {
    let node = &mut pending.node;
    match key {
        key::ID => pending.id = Some(unescape(value)),
        key::SEQ => match value.trim().parse() {
            Ok(seq) => pending.seq = Some(seq),
            Err(_) => warn!(value, "skipping malformed node seq"),
        },
        key::NAME => node.name = unescape(value),
        key::TYPE => match value.parse::<NodeType>() {
            Ok(node_type) => node.node_type = node_type,
            Err(e) => warn!(error = %e, "skipping node type"),
        },
        key::OWNER => node.owner = unescape(value),
        key::COST_CENTER => node.cost_center = unescape(value),
        key::DESCRIPTION => node.description = unescape(value),
        key::METADATA => set_decoded(&mut node.metadata, key, value),
        key::INTERFACES => set_decoded::<Vec<Interface>>(&mut node.interfaces, key, value),
        key::CONTROLS => set_decoded(&mut node.controls, key, value),
        _ => debug!(key, "unknown node annotation"),
    }
}

fn relationship_field(pending: &mut PendingRelationship, key: &str, value: &str) {
    match key {
        key::ID => pending.id = Some(unescape(value)),
        key::DESCRIPTION => pending.description = unescape(value),
        key::PROTOCOL => pending.protocol = unescape(value),
        key::CLASSIFICATION => pending.classification = unescape(value),
        key::ENCRYPTED => match value.trim().parse::<bool>() {
            Ok(flag) => pending.encrypted = Some(flag),
            Err(_) => warn!(value, "skipping malformed encrypted flag"),
        },
        key::METADATA => set_decoded(&mut pending.metadata, key, value),
        key::TYPE if value.trim() == key::INTERACTS => pending.make_interaction(),
        key::ACTOR | key::TARGET => {
            pending.make_interaction();
            if let EdgeShape::Interacts { actor, target } = &mut pending.shape {
                let slot = if key == key::ACTOR { actor } else { target };
                *slot = unescape(value);
            }
        }
        key::SOURCE | key::DESTINATION | key::SRC_INTERFACES | key::DST_INTERFACES => {
            let EdgeShape::Connects {
                source,
                destination,
            } = &mut pending.shape
            else {
                debug!(key, "connects annotation on an interaction edge");
                return;
            };
            match key {
                key::SOURCE => source.node = unescape(value),
                key::DESTINATION => destination.node = unescape(value),
                key::SRC_INTERFACES => set_decoded(&mut source.interfaces, key, value),
                _ => set_decoded(&mut destination.interfaces, key, value),
            }
        }
        _ => debug!(key, "unknown relationship annotation"),
    }
}

fn flow_field(flow: &mut Flow, key: &str, value: &str) {
    match key {
        key::ID => flow.id = unescape(value),
        key::NAME => flow.name = unescape(value),
        key::DESCRIPTION => flow.description = unescape(value),
        key::METADATA => set_decoded(&mut flow.metadata, key, value),
        _ => debug!(key, "unknown flow annotation"),
    }
}

fn decode<T: DeserializeOwned>(what: &str, payload: &str) -> Option<T> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(what, error = %e, "skipping malformed annotation value");
            None
        }
    }
}

fn set_decoded<T: DeserializeOwned>(slot: &mut T, what: &str, payload: &str) {
    if let Some(value) = decode(what, payload) {
        *slot = value;
    }
}

/// `platform.checkout.api` -> `api`
fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_hand_written_blocks() {
        let text = r#"
# CALM Architecture: Shop
# @calm:id=shop
# @calm:description=Online shop\nwith two lines

classes: {
  service: {
    shape: rectangle
  }
}

api: API {
  class: service
  # @calm:id=api
  # @calm:type=service
  # @calm:name=API
  # @calm:owner=platform
  # @calm:metadata={"health-endpoint":"/health"}
}
db: DB {
  # @calm:id=db
  # @calm:type=database
  # @calm:name=Orders DB
}

api -> db: JDBC {
  # @calm:id=api-db
  # @calm:protocol=JDBC
  # @calm:encrypted=true
}
"#;
        let arch = parse_annotated(text);
        assert_eq!(arch.id, "shop");
        assert_eq!(arch.description, "Online shop\nwith two lines");
        assert_eq!(arch.nodes.len(), 2);
        assert_eq!(arch.nodes[0].owner, "platform");
        assert_eq!(arch.nodes[0].metadata["health-endpoint"], json!("/health"));
        assert_eq!(arch.nodes[1].name, "Orders DB");
        assert_eq!(arch.nodes[1].node_type, NodeType::Database);

        let rel = &arch.relationships[0];
        assert_eq!(rel.encrypted, Some(true));
        assert_eq!(
            rel.kind,
            RelationshipType::Connects {
                source: NodeInterface::new("api"),
                destination: NodeInterface::new("db"),
            }
        );
    }

    #[test]
    fn malformed_values_are_skipped() {
        let text = "\
n: N {
  # @calm:id=n
  # @calm:metadata={not json
  # @calm:seq=abc
  # @calm:owner=ops
}
# @calm:composed-of {broken
";
        let arch = parse_annotated(text);
        assert_eq!(arch.nodes.len(), 1);
        assert!(arch.nodes[0].metadata.is_empty());
        assert_eq!(arch.nodes[0].owner, "ops");
        assert!(arch.relationships.is_empty());
    }

    #[test]
    fn undecodable_flow_keeps_its_fields_to_itself() {
        let text = "\
# @calm:id=shop
# @calm:description=Real arch description
# @calm:flow {broken
# @calm:description=Flow description
# @calm:metadata={\"sla\":1}
# @calm:flow-step {\"relationship-unique-id\":\"r\",\"sequence-number\":1,\"description\":\"\"}
# @calm:flow {\"unique-id\":\"ok\",\"name\":\"Ok\"}
# @calm:description=Second flow
";
        let arch = parse_annotated(text);
        assert_eq!(arch.description, "Real arch description");
        assert!(arch.metadata.is_empty());
        assert_eq!(arch.flows.len(), 1);
        assert_eq!(arch.flows[0].id, "ok");
        assert_eq!(arch.flows[0].description, "Second flow");
        assert!(arch.flows[0].transitions.is_empty());
    }

    #[test]
    fn interaction_blocks_merge() {
        let text = "\
u -> a {
  # @calm:id=u-uses
  # @calm:type=interacts
  # @calm:actor=user
  # @calm:target=app
}
u -> sys.b {
  # @calm:id=u-uses
  # @calm:type=interacts
  # @calm:actor=user
  # @calm:target=backend
}
";
        let arch = parse_annotated(text);
        assert_eq!(arch.relationships.len(), 1);
        assert_eq!(
            arch.relationships[0].kind,
            RelationshipType::Interacts {
                actor: "user".into(),
                nodes: vec!["app".into(), "backend".into()],
            }
        );
    }

    #[test]
    fn seq_restores_model_order() {
        let text = "\
b: B {
  # @calm:id=b
  # @calm:seq=1
}
a: A {
  # @calm:id=a
  # @calm:seq=0
}
";
        let ids: Vec<String> = parse_annotated(text).nodes.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn flow_steps_attach_to_current_flow() {
        let text = r#"
# @calm:flow-step {"relationship-unique-id":"orphan","sequence-number":1}
# @calm:flow {"unique-id":"f1","name":"Checkout"}
# @calm:description=Buy things
# @calm:flow-step {"relationship-unique-id":"r1","sequence-number":1,"description":"go","direction":"destination-to-source"}
# @calm:flow {"unique-id":"f2","name":"Refund"}
"#;
        let arch = parse_annotated(text);
        assert_eq!(arch.flows.len(), 2);
        assert_eq!(arch.flows[0].description, "Buy things");
        assert_eq!(arch.flows[0].transitions.len(), 1);
        assert_eq!(arch.flows[0].transitions[0].relationship_id, "r1");
        assert!(arch.flows[1].transitions.is_empty());
        assert_eq!(arch.description, "");
    }
}
