//! Validation rules.
//!
//! Every rule is an independent, pure check over an [`Architecture`]. The
//! engine runs all of them and concatenates their findings: rule order
//! first, then discovery order within a rule. Nothing short-circuits and
//! nothing mutates the model.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::{Architecture, NodeType, RelationshipType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub rule: String,
    /// Offending node, relationship or flow id; empty for model-wide findings.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    pub message: String,
}

impl ValidationError {
    fn new(rule: &str, node_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            node_id: node_id.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node_id.is_empty() {
            write!(f, "[{}] {}", self.rule, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.rule, self.node_id, self.message)
        }
    }
}

pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn validate(&self, arch: &Architecture) -> Vec<ValidationError>;
}

/// Run `rules` in order and collect every finding.
pub fn validate(arch: &Architecture, rules: &[&dyn ValidationRule]) -> Vec<ValidationError> {
    rules.iter().flat_map(|rule| rule.validate(arch)).collect()
}

impl Architecture {
    /// Validate against the default rule set.
    pub fn validate(&self) -> Vec<ValidationError> {
        validate(self, &default_rules())
    }
}

pub fn default_rules() -> Vec<&'static dyn ValidationRule> {
    vec![
        &AllNodesHaveOwner,
        &AllServicesHaveHealthEndpoint,
        &NoDanglingRelationships,
        &AllFlowsHaveValidTransitions,
        &AllDatabasesHaveBackupSchedule,
        &AllTier1NodesHaveRunbook,
    ]
}

/// The default rules plus the opt-in structural checks.
pub fn strict_rules() -> Vec<&'static dyn ValidationRule> {
    let mut rules = default_rules();
    rules.push(&NoUnusedNodes);
    rules.push(&UniqueIdentifiers);
    rules
}

pub fn rule_by_name(name: &str) -> Option<&'static dyn ValidationRule> {
    strict_rules().into_iter().find(|r| r.name() == name)
}

pub fn default_rule_names() -> Vec<String> {
    default_rules().iter().map(|r| r.name().to_string()).collect()
}

/// Human-readable list of every known rule, for tool instructions.
pub fn rules_overview() -> String {
    strict_rules()
        .iter()
        .map(|r| format!("- {}: {}", r.name(), r.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Rules ---

pub struct AllNodesHaveOwner;

impl ValidationRule for AllNodesHaveOwner {
    fn name(&self) -> &'static str {
        "AllNodesHaveOwner"
    }

    fn description(&self) -> &'static str {
        "every node has a non-empty owner"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        arch.nodes
            .iter()
            .filter(|n| n.owner.trim().is_empty())
            .map(|n| ValidationError::new(self.name(), &n.id, "missing owner"))
            .collect()
    }
}

pub struct AllServicesHaveHealthEndpoint;

impl ValidationRule for AllServicesHaveHealthEndpoint {
    fn name(&self) -> &'static str {
        "AllServicesHaveHealthEndpoint"
    }

    fn description(&self) -> &'static str {
        "every service declares a health-endpoint in its metadata"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        arch.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Service && !n.metadata.contains_key("health-endpoint"))
            .map(|n| {
                ValidationError::new(
                    self.name(),
                    &n.id,
                    "service missing health-endpoint in metadata",
                )
            })
            .collect()
    }
}

pub struct NoDanglingRelationships;

impl ValidationRule for NoDanglingRelationships {
    fn name(&self) -> &'static str {
        "NoDanglingRelationships"
    }

    fn description(&self) -> &'static str {
        "every node referenced by a relationship exists"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        let known: HashSet<&str> = arch.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut errors = Vec::new();
        let mut check = |rel_id: &str, role: &str, node: &str| {
            if !known.contains(node) {
                errors.push(ValidationError::new(
                    self.name(),
                    rel_id,
                    format!("{} {:?} does not exist", role, node),
                ));
            }
        };

        for rel in &arch.relationships {
            match &rel.kind {
                RelationshipType::Connects {
                    source,
                    destination,
                } => {
                    check(&rel.id, "source node", &source.node);
                    check(&rel.id, "destination node", &destination.node);
                }
                RelationshipType::Interacts { actor, nodes } => {
                    check(&rel.id, "actor", actor);
                    for n in nodes {
                        check(&rel.id, "target node", n);
                    }
                }
                RelationshipType::ComposedOf { container, nodes } => {
                    check(&rel.id, "container node", container);
                    for n in nodes {
                        check(&rel.id, "contained node", n);
                    }
                }
            }
        }
        errors
    }
}

pub struct AllFlowsHaveValidTransitions;

impl ValidationRule for AllFlowsHaveValidTransitions {
    fn name(&self) -> &'static str {
        "AllFlowsHaveValidTransitions"
    }

    fn description(&self) -> &'static str {
        "every flow transition references an existing relationship"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        let known: HashSet<&str> = arch.relationships.iter().map(|r| r.id.as_str()).collect();
        arch.flows
            .iter()
            .flat_map(|flow| {
                flow.transitions
                    .iter()
                    .filter(|t| !known.contains(t.relationship_id.as_str()))
                    .map(move |t| {
                        ValidationError::new(
                            self.name(),
                            &flow.id,
                            format!(
                                "transition references non-existent relationship {:?}",
                                t.relationship_id
                            ),
                        )
                    })
            })
            .collect()
    }
}

pub struct AllDatabasesHaveBackupSchedule;

impl ValidationRule for AllDatabasesHaveBackupSchedule {
    fn name(&self) -> &'static str {
        "AllDatabasesHaveBackupSchedule"
    }

    fn description(&self) -> &'static str {
        "every database declares a backup-schedule in its metadata"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        arch.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Database && !n.metadata.contains_key("backup-schedule"))
            .map(|n| {
                ValidationError::new(
                    self.name(),
                    &n.id,
                    "database missing backup-schedule in metadata",
                )
            })
            .collect()
    }
}

pub struct AllTier1NodesHaveRunbook;

impl ValidationRule for AllTier1NodesHaveRunbook {
    fn name(&self) -> &'static str {
        "AllTier1NodesHaveRunbook"
    }

    fn description(&self) -> &'static str {
        "every node with metadata tier \"tier-1\" declares a runbook"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        arch.nodes
            .iter()
            .filter(|n| {
                n.metadata.get("tier").and_then(|t| t.as_str()) == Some("tier-1")
                    && !n.metadata.contains_key("runbook")
            })
            .map(|n| {
                ValidationError::new(self.name(), &n.id, "tier-1 node missing runbook in metadata")
            })
            .collect()
    }
}

/// Not part of the default set.
pub struct NoUnusedNodes;

impl ValidationRule for NoUnusedNodes {
    fn name(&self) -> &'static str {
        "NoUnusedNodes"
    }

    fn description(&self) -> &'static str {
        "every node is referenced by at least one relationship"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        let used: HashSet<&str> = arch
            .relationships
            .iter()
            .flat_map(|r| r.referenced_nodes())
            .collect();
        arch.nodes
            .iter()
            .filter(|n| !used.contains(n.id.as_str()))
            .map(|n| {
                ValidationError::new(self.name(), &n.id, "node is not referenced by any relationship")
            })
            .collect()
    }
}

/// Not part of the default set.
pub struct UniqueIdentifiers;

impl ValidationRule for UniqueIdentifiers {
    fn name(&self) -> &'static str {
        "UniqueIdentifiers"
    }

    fn description(&self) -> &'static str {
        "node, relationship and flow ids are unique within their kind"
    }

    fn validate(&self, arch: &Architecture) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let groups: [(&str, Vec<&str>); 3] = [
            ("node", arch.nodes.iter().map(|n| n.id.as_str()).collect()),
            (
                "relationship",
                arch.relationships.iter().map(|r| r.id.as_str()).collect(),
            ),
            ("flow", arch.flows.iter().map(|f| f.id.as_str()).collect()),
        ];
        for (kind, ids) in groups {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for id in ids {
                let count = seen.entry(id).or_insert(0);
                *count += 1;
                // report each duplicate once
                if *count == 2 {
                    errors.push(ValidationError::new(
                        self.name(),
                        id,
                        format!("duplicate {} id", kind),
                    ));
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn healthy() -> Architecture {
        let mut arch = Architecture::new("shop", "Shop", "");
        arch.define_node("user", NodeType::Actor, "User", "")
            .with_owner("growth");
        arch.define_node("api", NodeType::Service, "API", "")
            .with_owner("platform")
            .with_meta("health-endpoint", json!("/health"))
            .with_meta("tier", json!("tier-1"))
            .with_meta("runbook", json!("https://runbooks/api"));
        arch.define_node("db", NodeType::Database, "DB", "")
            .with_owner("data")
            .with_meta("backup-schedule", json!("daily"));
        arch.interacts("user-api", "", "user", &["api"]);
        arch.connect("api-db", "", "api", "db");
        arch.define_flow("checkout", "Checkout", "").step(
            "api-db",
            1,
            "store",
            crate::model::TransitionDirection::SourceToDestination,
        );
        arch
    }

    #[test]
    fn healthy_model_passes_every_rule() {
        assert!(validate(&healthy(), &strict_rules()).is_empty());
    }

    #[test]
    fn dangling_references_report_per_missing_id() {
        let mut arch = healthy();
        arch.interacts("ghosts", "", "nobody", &["api", "missing"]);
        let errors = NoDanglingRelationships.validate(&arch);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0].to_string(),
            "[NoDanglingRelationships] ghosts: actor \"nobody\" does not exist"
        );
        assert!(errors[1].message.starts_with("target node \"missing\""));
    }

    #[test]
    fn tier_one_requires_runbook() {
        let mut arch = healthy();
        arch.node_mut("api").unwrap().metadata.remove("runbook");
        let errors = validate(&arch, &default_rules());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "AllTier1NodesHaveRunbook");
    }

    #[test]
    fn unused_nodes_only_in_strict_set() {
        let mut arch = healthy();
        arch.define_node("orphan", NodeType::Queue, "Orphan", "")
            .with_owner("ops");
        assert!(arch.validate().is_empty());

        let errors = validate(&arch, &strict_rules());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node_id, "orphan");
    }

    #[test]
    fn duplicate_ids_reported_once() {
        let mut arch = healthy();
        for _ in 0..2 {
            arch.define_node("db", NodeType::Database, "DB", "")
                .with_owner("data")
                .with_meta("backup-schedule", json!("daily"));
        }
        let errors = UniqueIdentifiers.validate(&arch);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "[UniqueIdentifiers] db: duplicate node id");
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(rule_by_name("NoUnusedNodes").unwrap().name(), "NoUnusedNodes");
        assert!(rule_by_name("Nope").is_none());
        assert!(rules_overview().contains("AllNodesHaveOwner"));
    }
}
