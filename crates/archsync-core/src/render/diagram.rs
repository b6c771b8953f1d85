use std::fmt::Write as _;

use super::Renderer;
use crate::annotation::{d2_id, d2_label, field_line};
use crate::containment::Containment;
use crate::error::RenderError;
use crate::model::{Architecture, Node, Relationship, RelationshipType};

pub(super) const DEFAULT_DIRECTION: &str = "right";

const CLASSES: &str = "\
classes: {
  actor: {
    shape: person
    style.fill: \"#e1f5fe\"
  }
  service: {
    shape: rectangle
    style.fill: \"#e8f5e9\"
    style.border-radius: 8
  }
  database: {
    shape: cylinder
    style.fill: \"#fff3e0\"
  }
  queue: {
    shape: queue
    style.fill: \"#f3e5f5\"
  }
  system: {
    shape: rectangle
    style.fill: \"#fafafa\"
    style.stroke-dash: 3
  }
  webclient: {
    shape: page
    style.fill: \"#e3f2fd\"
  }
}
";

pub(super) type Fields = Vec<(&'static str, String)>;

/// Extra content layered onto the plain diagram.
///
/// The plain renderer uses the no-op defaults; the annotated renderer fills
/// every hook so the text carries the whole model.
pub(super) trait Annotator {
    fn architecture(&self, _arch: &Architecture) -> Result<Fields, RenderError> {
        Ok(Vec::new())
    }

    fn node(&self, _node: &Node, _seq: usize) -> Result<Fields, RenderError> {
        Ok(Vec::new())
    }

    fn connects(&self, _rel: &Relationship) -> Result<Fields, RenderError> {
        Ok(Vec::new())
    }

    fn interaction(&self, _rel: &Relationship, _target: &str) -> Result<Fields, RenderError> {
        Ok(Vec::new())
    }

    /// A relationship with no edge to draw (composition, empty interaction).
    fn unshaped(&self, _rel: &Relationship) -> Result<Option<String>, RenderError> {
        Ok(None)
    }

    /// Content after the relationship section (controls, flows).
    fn trailer(&self, _arch: &Architecture) -> Result<String, RenderError> {
        Ok(String::new())
    }
}

struct Plain;

impl Annotator for Plain {}

/// Plain D2: nested containers and labelled edges.
#[derive(Debug, Clone)]
pub struct DiagramRenderer {
    pub direction: String,
}

impl Default for DiagramRenderer {
    fn default() -> Self {
        Self {
            direction: DEFAULT_DIRECTION.to_string(),
        }
    }
}

impl Renderer for DiagramRenderer {
    fn render(&self, arch: &Architecture) -> Result<String, RenderError> {
        write_d2(arch, &self.direction, &Plain)
    }
}

/// `protocol (classification)`, either part optional.
pub fn edge_label(rel: &Relationship) -> String {
    let protocol = d2_label(&rel.protocol);
    let classification = d2_label(&rel.data_classification);
    match (protocol.is_empty(), classification.is_empty()) {
        (true, true) => String::new(),
        (false, true) => protocol,
        (true, false) => format!("({})", classification),
        (false, false) => format!("{} ({})", protocol, classification),
    }
}

pub(super) fn write_d2(
    arch: &Architecture,
    direction: &str,
    annotator: &dyn Annotator,
) -> Result<String, RenderError> {
    let containment = Containment::build(arch);
    let mut out = String::new();

    let _ = writeln!(out, "# CALM Architecture: {}", d2_label(&arch.name));
    for (key, value) in annotator.architecture(arch)? {
        out.push_str(&field_line("", key, &value));
    }
    out.push('\n');
    let _ = writeln!(out, "direction: {}\n", direction);
    out.push_str(CLASSES);
    out.push('\n');

    // Open container depths, innermost last.
    let mut open: Vec<usize> = Vec::new();
    for placed in containment.walk(arch) {
        while open.last().is_some_and(|&d| d >= placed.depth) {
            if let Some(depth) = open.pop() {
                close_block(&mut out, depth);
            }
        }

        let indent = "  ".repeat(placed.depth);
        let node = placed.node;
        let _ = writeln!(
            out,
            "{}{}: {} {{",
            indent,
            d2_id(&node.id),
            d2_label(&node.name)
        );
        let _ = writeln!(out, "{}  class: {}", indent, node.node_type);
        if !node.owner.is_empty() {
            let _ = writeln!(out, "{}  tooltip: \"Owner: {}\"", indent, d2_label(&node.owner));
        }
        let inner = format!("{}  ", indent);
        for (key, value) in annotator.node(node, placed.index)? {
            out.push_str(&field_line(&inner, key, &value));
        }

        if placed.has_children {
            open.push(placed.depth);
        } else {
            close_block(&mut out, placed.depth);
        }
    }
    while let Some(depth) = open.pop() {
        close_block(&mut out, depth);
    }

    out.push_str("\n# Relationships\n");
    let path = |id: &str| containment.path(id, d2_id);
    for rel in &arch.relationships {
        match &rel.kind {
            RelationshipType::Connects {
                source,
                destination,
            } => {
                let fields = annotator.connects(rel)?;
                write_edge(
                    &mut out,
                    &path(&source.node),
                    &path(&destination.node),
                    &edge_label(rel),
                    &fields,
                );
            }
            RelationshipType::Interacts { actor, nodes } if !nodes.is_empty() => {
                for target in nodes {
                    let fields = annotator.interaction(rel, target)?;
                    write_edge(&mut out, &d2_id(actor), &path(target), "", &fields);
                }
            }
            RelationshipType::Interacts { .. } | RelationshipType::ComposedOf { .. } => {
                if let Some(line) = annotator.unshaped(rel)? {
                    out.push_str(&line);
                }
            }
        }
    }

    out.push_str(&annotator.trailer(arch)?);
    Ok(out)
}

fn close_block(out: &mut String, depth: usize) {
    let _ = writeln!(out, "{}}}", "  ".repeat(depth));
}

fn write_edge(out: &mut String, from: &str, to: &str, label: &str, fields: &Fields) {
    out.push_str(from);
    out.push_str(" -> ");
    out.push_str(to);
    if !label.is_empty() {
        out.push_str(": ");
        out.push_str(label);
    }
    if fields.is_empty() {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");
    for (key, value) in fields {
        out.push_str(&field_line("  ", key, value));
    }
    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use pretty_assertions::assert_eq;

    #[test]
    fn edge_label_combines_protocol_and_classification() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("a", NodeType::Service, "A", "");
        arch.define_node("b", NodeType::Database, "B", "");
        arch.connect("a-b", "", "a", "b")
            .with_protocol("grpc")
            .with_classification("confidential");

        let d2 = DiagramRenderer::default().render(&arch).unwrap();
        assert!(d2.contains("a -> b: grpc (confidential)\n"));

        arch.relationships[0].protocol.clear();
        assert_eq!(edge_label(&arch.relationships[0]), "(confidential)");
        arch.relationships[0].data_classification.clear();
        assert_eq!(edge_label(&arch.relationships[0]), "");
    }

    #[test]
    fn interactions_are_unlabelled() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("u", NodeType::Actor, "U", "");
        arch.define_node("web", NodeType::WebClient, "Web", "");
        arch.interacts("u-web", "", "u", &["web"])
            .with_protocol("HTTPS")
            .with_classification("public");

        let d2 = DiagramRenderer::default().render(&arch).unwrap();
        assert!(d2.ends_with("# Relationships\nu -> web\n"), "{}", d2);
    }

    #[test]
    fn edges_only_name_rendered_shapes() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("api", NodeType::Service, "API", "");
        arch.define_node("db", NodeType::Database, "DB", "");
        arch.define_node("x", NodeType::System, "X", "");
        arch.define_node("y", NodeType::System, "Y", "");
        arch.define_node("z", NodeType::Service, "Z", "");
        arch.composed_of("ghost-has", "", "ghost", &["api"]);
        arch.composed_of("x-has", "", "x", &["y"]);
        arch.composed_of("y-has", "", "y", &["x"]);
        arch.connect("api-db", "", "api", "db");
        arch.connect("z-x", "", "z", "x");
        arch.connect("z-y", "", "z", "y");

        let d2 = DiagramRenderer::default().render(&arch).unwrap();
        assert!(d2.contains("\napi: API {\n"), "{}", d2);
        assert!(d2.contains("\nx: X {\n  class: system\n  y: Y {\n"), "{}", d2);
        assert!(
            d2.ends_with("# Relationships\napi -> db\nz -> x\nz -> x.y\n"),
            "{}",
            d2
        );
    }

    #[test]
    fn containers_nest_and_edges_use_paths() {
        let mut arch = Architecture::new("shop", "Shop", "");
        arch.define_node("user", NodeType::Actor, "User", "");
        arch.define_node("platform", NodeType::System, "Platform", "")
            .with_owner("core");
        arch.define_node("api", NodeType::Service, "API", "");
        arch.composed_of("platform-has", "", "platform", &["api"]);
        arch.interacts("user-api", "", "user", &["api"]);

        let d2 = DiagramRenderer::default().render(&arch).unwrap();
        let expected_nodes = "\
user: User {
  class: actor
}
platform: Platform {
  class: system
  tooltip: \"Owner: core\"
  api: API {
    class: service
  }
}
";
        assert!(d2.contains(expected_nodes), "{}", d2);
        assert!(d2.ends_with("# Relationships\nuser -> platform.api\n"));
        assert!(!d2.contains("@calm"));
    }

    #[test]
    fn first_composition_decides_nesting() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("left", NodeType::System, "Left", "");
        arch.define_node("right", NodeType::System, "Right", "");
        arch.define_node("n", NodeType::Service, "N", "");
        arch.define_node("m", NodeType::Service, "M", "");
        arch.composed_of("l", "", "left", &["n"]);
        arch.composed_of("r", "", "right", &["n", "m"]);
        arch.connect("m-n", "", "m", "n");

        let d2 = DiagramRenderer::default().render(&arch).unwrap();
        assert!(d2.contains("left: Left {\n  class: system\n  n: N {"));
        assert!(d2.contains("right.m -> left.n\n"));
    }
}
