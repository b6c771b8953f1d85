use serde_json::Value;
use std::fmt::Write as _;

use super::Renderer;
use crate::error::RenderError;
use crate::model::{
    Architecture, Controls, Interface, Metadata, Node, Relationship, RelationshipType,
    Requirement, RequirementConfig, CALM_SCHEMA,
};

/// Rust construction code written against the builder DSL.
///
/// Node declarations come out as `arch.define_node(id, type, name, description)`
/// statements, the shape the source patcher edits in place.
#[derive(Debug, Clone)]
pub struct SourceRenderer {
    pub function_name: String,
    pub receiver: String,
}

impl Default for SourceRenderer {
    fn default() -> Self {
        Self {
            function_name: "build_architecture".to_string(),
            receiver: "arch".to_string(),
        }
    }
}

impl Renderer for SourceRenderer {
    fn render(&self, arch: &Architecture) -> Result<String, RenderError> {
        let r = &self.receiver;
        let mut out = String::new();
        out.push_str("use archsync_core::prelude::*;\n\n");
        let _ = writeln!(out, "pub fn {}() -> Architecture {{", self.function_name);
        let _ = writeln!(
            out,
            "    let mut {} = Architecture::new({}, {}, {});",
            r,
            lit(&arch.id),
            lit(&arch.name),
            lit(&arch.description)
        );
        if arch.schema != CALM_SCHEMA {
            let _ = writeln!(out, "    {}.schema = {}.to_string();", r, lit(&arch.schema));
        }
        for adr in &arch.adrs {
            let _ = writeln!(out, "    {}.add_adr({});", r, lit(adr));
        }
        for (key, value) in &arch.metadata {
            let _ = writeln!(out, "    {}.add_meta({}, {});", r, lit(key), json_macro(value));
        }
        for (id, control) in &arch.controls {
            let _ = writeln!(
                out,
                "    {}.define_control({}, {}, {});",
                r,
                lit(id),
                lit(&control.description),
                requirements(&control.requirements)
            );
        }

        if !arch.nodes.is_empty() {
            out.push('\n');
        }
        for node in &arch.nodes {
            write_node(&mut out, r, node);
        }

        if !arch.relationships.is_empty() {
            out.push('\n');
        }
        for rel in &arch.relationships {
            write_relationship(&mut out, r, rel);
        }

        if !arch.flows.is_empty() {
            out.push('\n');
        }
        for flow in &arch.flows {
            let mut options = Vec::new();
            push_meta(&mut options, &flow.metadata);
            for t in &flow.transitions {
                options.push(format!(
                    "step({}, {}, {}, TransitionDirection::{})",
                    lit(&t.relationship_id),
                    t.sequence_number,
                    lit(&t.description),
                    t.direction.variant_name()
                ));
            }
            let head = format!(
                "{}.define_flow({}, {}, {})",
                r,
                lit(&flow.id),
                lit(&flow.name),
                lit(&flow.description)
            );
            write_statement(&mut out, &head, &options);
        }

        out.push('\n');
        let _ = writeln!(out, "    {}", r);
        out.push_str("}\n");
        Ok(out)
    }
}

fn write_node(out: &mut String, r: &str, node: &Node) {
    let head = format!(
        "{}.define_node({}, NodeType::{}, {}, {})",
        r,
        lit(&node.id),
        node.node_type.variant_name(),
        lit(&node.name),
        lit(&node.description)
    );
    let mut options = Vec::new();
    if !node.owner.is_empty() {
        options.push(format!("with_owner({})", lit(&node.owner)));
    }
    if !node.cost_center.is_empty() {
        options.push(format!("with_cost_center({})", lit(&node.cost_center)));
    }
    push_meta(&mut options, &node.metadata);
    for interface in &node.interfaces {
        options.push(format!("with_interface({})", interface_expr(interface)));
    }
    push_controls(&mut options, &node.controls);
    write_statement(out, &head, &options);
}

fn write_relationship(out: &mut String, r: &str, rel: &Relationship) {
    let mut options = Vec::new();
    let head = match &rel.kind {
        RelationshipType::Connects {
            source,
            destination,
        } => {
            if !source.interfaces.is_empty() {
                options.push(format!("with_source_interfaces({})", str_slice(&source.interfaces)));
            }
            if !destination.interfaces.is_empty() {
                options.push(format!(
                    "with_destination_interfaces({})",
                    str_slice(&destination.interfaces)
                ));
            }
            format!(
                "{}.connect({}, {}, {}, {})",
                r,
                lit(&rel.id),
                lit(&rel.description),
                lit(&source.node),
                lit(&destination.node)
            )
        }
        RelationshipType::Interacts { actor, nodes } => format!(
            "{}.interacts({}, {}, {}, {})",
            r,
            lit(&rel.id),
            lit(&rel.description),
            lit(actor),
            str_slice(nodes)
        ),
        RelationshipType::ComposedOf { container, nodes } => format!(
            "{}.composed_of({}, {}, {}, {})",
            r,
            lit(&rel.id),
            lit(&rel.description),
            lit(container),
            str_slice(nodes)
        ),
    };
    if !rel.protocol.is_empty() {
        options.push(format!("with_protocol({})", lit(&rel.protocol)));
    }
    if !rel.data_classification.is_empty() {
        options.push(format!("with_classification({})", lit(&rel.data_classification)));
    }
    if let Some(encrypted) = rel.encrypted {
        options.push(format!("with_encryption({})", encrypted));
    }
    push_meta(&mut options, &rel.metadata);
    write_statement(out, &head, &options);
}

fn write_statement(out: &mut String, head: &str, options: &[String]) {
    out.push_str("    ");
    out.push_str(head);
    for option in options {
        out.push_str("\n        .");
        out.push_str(option);
    }
    out.push_str(";\n");
}

fn push_meta(options: &mut Vec<String>, metadata: &Metadata) {
    for (key, value) in metadata {
        options.push(format!("with_meta({}, {})", lit(key), json_macro(value)));
    }
}

fn push_controls(options: &mut Vec<String>, controls: &Controls) {
    for (id, control) in controls {
        options.push(format!(
            "with_control({}, {}, {})",
            lit(id),
            lit(&control.description),
            requirements(&control.requirements)
        ));
    }
}

fn interface_expr(interface: &Interface) -> String {
    let mut expr = format!(
        "Interface::new({}, {})",
        lit(&interface.id),
        lit(&interface.protocol)
    );
    let optional = [
        ("with_name", &interface.name),
        ("with_host", &interface.host),
        ("with_path", &interface.path),
        ("with_description", &interface.description),
        ("with_database", &interface.database),
    ];
    if let Some(port) = interface.port {
        let _ = write!(expr, ".with_port({})", port);
    }
    for (method, value) in optional {
        if let Some(value) = value {
            let _ = write!(expr, ".{}({})", method, lit(value));
        }
    }
    expr
}

fn requirements(requirements: &[Requirement]) -> String {
    let items: Vec<String> = requirements
        .iter()
        .map(|req| match &req.source {
            RequirementConfig::Inline { config } => format!(
                "Requirement::inline({}, {})",
                lit(&req.requirement_url),
                json_macro(config)
            ),
            RequirementConfig::Document { config_url } => format!(
                "Requirement::document({}, {})",
                lit(&req.requirement_url),
                lit(config_url)
            ),
        })
        .collect();
    format!("vec![{}]", items.join(", "))
}

/// Rust string literal.
fn lit(text: &str) -> String {
    format!("{:?}", text)
}

fn str_slice(items: &[String]) -> String {
    let items: Vec<String> = items.iter().map(|i| lit(i)).collect();
    format!("&[{}]", items.join(", "))
}

fn json_macro(value: &Value) -> String {
    format!("json!({})", json_tokens(value))
}

/// JSON value spelled with Rust literals, so escapes stay valid inside `json!`.
fn json_tokens(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => lit(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(json_tokens).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", lit(k), json_tokens(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeType, TransitionDirection};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn renders_builder_calls() {
        let mut arch = Architecture::new("shop", "Shop", "Sells \"things\"");
        arch.define_node("api", NodeType::Service, "API", "Public API")
            .with_owner("platform")
            .with_meta("ports", json!([80, 443]))
            .with_interface(Interface::new("http", "HTTPS").with_port(443));
        arch.define_node("db", NodeType::Database, "DB", "");
        arch.connect("api-db", "stores", "api", "db")
            .with_protocol("JDBC")
            .with_encryption(true);
        arch.define_flow("f", "Flow", "")
            .step("api-db", 1, "write", TransitionDirection::SourceToDestination);

        let source = SourceRenderer::default().render(&arch).unwrap();
        let expected = r#"use archsync_core::prelude::*;

pub fn build_architecture() -> Architecture {
    let mut arch = Architecture::new("shop", "Shop", "Sells \"things\"");

    arch.define_node("api", NodeType::Service, "API", "Public API")
        .with_owner("platform")
        .with_meta("ports", json!([80, 443]))
        .with_interface(Interface::new("http", "HTTPS").with_port(443));
    arch.define_node("db", NodeType::Database, "DB", "");

    arch.connect("api-db", "stores", "api", "db")
        .with_protocol("JDBC")
        .with_encryption(true);

    arch.define_flow("f", "Flow", "")
        .step("api-db", 1, "write", TransitionDirection::SourceToDestination);

    arch
}
"#;
        assert_eq!(source, expected);
    }

    #[test]
    fn json_tokens_use_rust_escapes() {
        let value = json!({"ctl": "\u{1}", "n": null});
        assert_eq!(json_tokens(&value), "{\"ctl\": \"\\u{1}\", \"n\": null}");
    }
}
