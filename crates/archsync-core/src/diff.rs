//! Human-readable change summary between two versions of a model.

use std::collections::HashMap;

use crate::model::{Architecture, Flow, Node, Relationship};

const NO_CHANGES: &str = "No changes since last seen.";

/// Summarise what changed from `baseline` to `current`, section by section.
pub fn compute_diff(baseline: &Architecture, current: &Architecture) -> String {
    let mut sections: Vec<String> = Vec::new();

    node_sections(baseline, current, &mut sections);
    relationship_sections(baseline, current, &mut sections);
    flow_sections(baseline, current, &mut sections);

    let mut arch_changes: Vec<String> = Vec::new();
    if baseline.name != current.name {
        arch_changes.push(format!("name \"{}\" -> \"{}\"", baseline.name, current.name));
    }
    if baseline.description != current.description {
        arch_changes.push("description changed".to_string());
    }
    if baseline.metadata != current.metadata {
        arch_changes.push(counted("metadata", baseline.metadata.len(), current.metadata.len()));
    }
    if baseline.controls != current.controls {
        arch_changes.push(counted("controls", baseline.controls.len(), current.controls.len()));
    }
    if baseline.adrs != current.adrs {
        arch_changes.push(counted("adrs", baseline.adrs.len(), current.adrs.len()));
    }
    if !arch_changes.is_empty() {
        sections.push(format!("Architecture: {}", arch_changes.join(", ")));
    }

    if sections.is_empty() {
        NO_CHANGES.to_string()
    } else {
        sections.join("\n\n")
    }
}

fn counted(what: &str, before: usize, after: usize) -> String {
    format!("{} changed ({} -> {} entries)", what, before, after)
}

fn short(text: &str) -> String {
    if text.chars().count() > 80 {
        let head: String = text.chars().take(77).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn node_sections(baseline: &Architecture, current: &Architecture, sections: &mut Vec<String>) {
    let base: HashMap<&str, &Node> = baseline.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let curr: HashMap<&str, &Node> = current.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let added: Vec<&Node> = current
        .nodes
        .iter()
        .filter(|n| !base.contains_key(n.id.as_str()))
        .collect();
    if !added.is_empty() {
        let mut lines = vec![format!("Nodes added ({}):", added.len())];
        for n in &added {
            let mut detail = format!("  - {} \"{}\" ({})", n.id, n.name, n.node_type);
            if !n.owner.is_empty() {
                detail.push_str(&format!(", owner={}", n.owner));
            }
            if !n.description.is_empty() {
                detail.push_str(&format!(", description=\"{}\"", short(&n.description)));
            }
            lines.push(detail);
        }
        sections.push(lines.join("\n"));
    }

    let removed: Vec<&Node> = baseline
        .nodes
        .iter()
        .filter(|n| !curr.contains_key(n.id.as_str()))
        .collect();
    if !removed.is_empty() {
        let mut lines = vec![format!("Nodes removed ({}):", removed.len())];
        for n in &removed {
            lines.push(format!("  - {} \"{}\" ({})", n.id, n.name, n.node_type));
        }
        sections.push(lines.join("\n"));
    }

    let mut modified: Vec<String> = Vec::new();
    for c in &current.nodes {
        let Some(b) = base.get(c.id.as_str()) else {
            continue;
        };
        let mut changes: Vec<String> = Vec::new();
        if b.name != c.name {
            changes.push(format!("name \"{}\" -> \"{}\"", b.name, c.name));
        }
        if b.node_type != c.node_type {
            changes.push(format!("type {} -> {}", b.node_type, c.node_type));
        }
        if b.owner != c.owner {
            changes.push(format!("owner {} -> {}", or_none(&b.owner), or_none(&c.owner)));
        }
        if b.cost_center != c.cost_center {
            changes.push(format!(
                "costCenter {} -> {}",
                or_none(&b.cost_center),
                or_none(&c.cost_center)
            ));
        }
        if b.description != c.description {
            changes.push("description changed".to_string());
        }
        if b.metadata != c.metadata {
            changes.push(counted("metadata", b.metadata.len(), c.metadata.len()));
        }
        if b.interfaces != c.interfaces {
            changes.push(counted("interfaces", b.interfaces.len(), c.interfaces.len()));
        }
        if b.controls != c.controls {
            changes.push(counted("controls", b.controls.len(), c.controls.len()));
        }
        if !changes.is_empty() {
            modified.push(format!("  - {} (\"{}\"): {}", c.id, c.name, changes.join(", ")));
        }
    }
    if !modified.is_empty() {
        sections.push(format!(
            "Nodes modified ({}):\n{}",
            modified.len(),
            modified.join("\n")
        ));
    }
}

fn or_none(value: &str) -> &str {
    if value.is_empty() {
        "none"
    } else {
        value
    }
}

fn describe_relationship(rel: &Relationship) -> String {
    format!(
        "  - {} [{}]: {}",
        rel.id,
        rel.kind_name(),
        rel.referenced_nodes().join(", ")
    )
}

fn relationship_sections(
    baseline: &Architecture,
    current: &Architecture,
    sections: &mut Vec<String>,
) {
    let base: HashMap<&str, &Relationship> = baseline
        .relationships
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();
    let curr: HashMap<&str, &Relationship> = current
        .relationships
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();

    let added: Vec<&Relationship> = current
        .relationships
        .iter()
        .filter(|r| !base.contains_key(r.id.as_str()))
        .collect();
    if !added.is_empty() {
        let mut lines = vec![format!("Relationships added ({}):", added.len())];
        lines.extend(added.iter().map(|r| describe_relationship(r)));
        sections.push(lines.join("\n"));
    }

    let removed: Vec<&Relationship> = baseline
        .relationships
        .iter()
        .filter(|r| !curr.contains_key(r.id.as_str()))
        .collect();
    if !removed.is_empty() {
        let mut lines = vec![format!("Relationships removed ({}):", removed.len())];
        lines.extend(removed.iter().map(|r| describe_relationship(r)));
        sections.push(lines.join("\n"));
    }

    let mut modified: Vec<String> = Vec::new();
    for c in &current.relationships {
        let Some(b) = base.get(c.id.as_str()) else {
            continue;
        };
        let mut changes: Vec<String> = Vec::new();
        if b.kind != c.kind {
            changes.push(format!(
                "{} ({}) -> {} ({})",
                b.kind_name(),
                b.referenced_nodes().join(", "),
                c.kind_name(),
                c.referenced_nodes().join(", ")
            ));
        }
        if b.protocol != c.protocol {
            changes.push(format!(
                "protocol {} -> {}",
                or_none(&b.protocol),
                or_none(&c.protocol)
            ));
        }
        if b.data_classification != c.data_classification {
            changes.push(format!(
                "classification {} -> {}",
                or_none(&b.data_classification),
                or_none(&c.data_classification)
            ));
        }
        if b.encrypted != c.encrypted {
            changes.push(format!("encrypted {:?} -> {:?}", b.encrypted, c.encrypted));
        }
        if b.description != c.description {
            changes.push("description changed".to_string());
        }
        if b.metadata != c.metadata {
            changes.push(counted("metadata", b.metadata.len(), c.metadata.len()));
        }
        if !changes.is_empty() {
            modified.push(format!("  - {}: {}", c.id, changes.join(", ")));
        }
    }
    if !modified.is_empty() {
        sections.push(format!(
            "Relationships modified ({}):\n{}",
            modified.len(),
            modified.join("\n")
        ));
    }
}

fn flow_sections(baseline: &Architecture, current: &Architecture, sections: &mut Vec<String>) {
    let base: HashMap<&str, &Flow> = baseline.flows.iter().map(|f| (f.id.as_str(), f)).collect();
    let curr: HashMap<&str, &Flow> = current.flows.iter().map(|f| (f.id.as_str(), f)).collect();

    let added: Vec<&Flow> = current
        .flows
        .iter()
        .filter(|f| !base.contains_key(f.id.as_str()))
        .collect();
    if !added.is_empty() {
        let mut lines = vec![format!("Flows added ({}):", added.len())];
        for f in &added {
            lines.push(format!(
                "  - {} \"{}\" ({} steps)",
                f.id,
                f.name,
                f.transitions.len()
            ));
        }
        sections.push(lines.join("\n"));
    }

    let removed: Vec<&Flow> = baseline
        .flows
        .iter()
        .filter(|f| !curr.contains_key(f.id.as_str()))
        .collect();
    if !removed.is_empty() {
        let mut lines = vec![format!("Flows removed ({}):", removed.len())];
        for f in &removed {
            lines.push(format!("  - {} \"{}\"", f.id, f.name));
        }
        sections.push(lines.join("\n"));
    }

    let mut modified: Vec<String> = Vec::new();
    for c in &current.flows {
        let Some(b) = base.get(c.id.as_str()) else {
            continue;
        };
        let mut changes: Vec<String> = Vec::new();
        if b.name != c.name {
            changes.push(format!("name \"{}\" -> \"{}\"", b.name, c.name));
        }
        if b.description != c.description {
            changes.push("description changed".to_string());
        }
        if b.transitions != c.transitions {
            changes.push(format!(
                "steps changed ({} -> {})",
                b.transitions.len(),
                c.transitions.len()
            ));
        }
        if b.metadata != c.metadata {
            changes.push(counted("metadata", b.metadata.len(), c.metadata.len()));
        }
        if !changes.is_empty() {
            modified.push(format!("  - {} (\"{}\"): {}", c.id, c.name, changes.join(", ")));
        }
    }
    if !modified.is_empty() {
        sections.push(format!(
            "Flows modified ({}):\n{}",
            modified.len(),
            modified.join("\n")
        ));
    }
}
