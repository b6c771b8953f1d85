use serde::Serialize;
use std::collections::BTreeMap;

use super::diagram::{write_d2, Annotator, Fields, DEFAULT_DIRECTION};
use super::Renderer;
use crate::annotation::{escape, field_line, key, marker, marker_line};
use crate::error::RenderError;
use crate::model::{Architecture, Control, Node, Relationship, RelationshipType};

/// D2 plus `@calm` annotations carrying every model field.
#[derive(Debug, Clone)]
pub struct AnnotatedRenderer {
    pub direction: String,
}

impl Default for AnnotatedRenderer {
    fn default() -> Self {
        Self {
            direction: DEFAULT_DIRECTION.to_string(),
        }
    }
}

impl Renderer for AnnotatedRenderer {
    fn render(&self, arch: &Architecture) -> Result<String, RenderError> {
        write_d2(arch, &self.direction, &Rich)
    }
}

#[derive(Serialize)]
struct FlowHeader<'a> {
    #[serde(rename = "unique-id")]
    id: &'a str,
    name: &'a str,
}

fn json<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<String, RenderError> {
    serde_json::to_string(value).map_err(|e| RenderError::encode(what, e))
}

fn push_text(fields: &mut Fields, key: &'static str, value: &str) {
    if !value.is_empty() {
        fields.push((key, escape(value)));
    }
}

/// Fields shared by every drawable relationship block.
fn relationship_common(rel: &Relationship, fields: &mut Fields) -> Result<(), RenderError> {
    push_text(fields, key::DESCRIPTION, &rel.description);
    push_text(fields, key::PROTOCOL, &rel.protocol);
    push_text(fields, key::CLASSIFICATION, &rel.data_classification);
    if let Some(encrypted) = rel.encrypted {
        fields.push((key::ENCRYPTED, encrypted.to_string()));
    }
    if !rel.metadata.is_empty() {
        fields.push((key::METADATA, json("relationship metadata", &rel.metadata)?));
    }
    Ok(())
}

struct Rich;

impl Annotator for Rich {
    fn architecture(&self, arch: &Architecture) -> Result<Fields, RenderError> {
        let mut fields = vec![(key::ID, escape(&arch.id))];
        push_text(&mut fields, key::NAME, &arch.name);
        push_text(&mut fields, key::DESCRIPTION, &arch.description);
        push_text(&mut fields, key::SCHEMA, &arch.schema);
        if !arch.adrs.is_empty() {
            fields.push((key::ADRS, json("adrs", &arch.adrs)?));
        }
        if !arch.metadata.is_empty() {
            fields.push((key::METADATA, json("architecture metadata", &arch.metadata)?));
        }
        Ok(fields)
    }

    fn node(&self, node: &Node, seq: usize) -> Result<Fields, RenderError> {
        let mut fields = vec![
            (key::ID, escape(&node.id)),
            (key::SEQ, seq.to_string()),
            (key::TYPE, node.node_type.to_string()),
        ];
        push_text(&mut fields, key::NAME, &node.name);
        push_text(&mut fields, key::OWNER, &node.owner);
        push_text(&mut fields, key::COST_CENTER, &node.cost_center);
        push_text(&mut fields, key::DESCRIPTION, &node.description);
        if !node.metadata.is_empty() {
            fields.push((key::METADATA, json("node metadata", &node.metadata)?));
        }
        if !node.interfaces.is_empty() {
            fields.push((key::INTERFACES, json("interfaces", &node.interfaces)?));
        }
        if !node.controls.is_empty() {
            fields.push((key::CONTROLS, json("node controls", &node.controls)?));
        }
        Ok(fields)
    }

    fn connects(&self, rel: &Relationship) -> Result<Fields, RenderError> {
        let mut fields = vec![(key::ID, escape(&rel.id))];
        if let RelationshipType::Connects {
            source,
            destination,
        } = &rel.kind
        {
            fields.push((key::SOURCE, escape(&source.node)));
            fields.push((key::DESTINATION, escape(&destination.node)));
            if !source.interfaces.is_empty() {
                fields.push((key::SRC_INTERFACES, json("interfaces", &source.interfaces)?));
            }
            if !destination.interfaces.is_empty() {
                fields.push((key::DST_INTERFACES, json("interfaces", &destination.interfaces)?));
            }
        }
        relationship_common(rel, &mut fields)?;
        Ok(fields)
    }

    fn interaction(&self, rel: &Relationship, target: &str) -> Result<Fields, RenderError> {
        let mut fields = vec![
            (key::ID, escape(&rel.id)),
            (key::TYPE, key::INTERACTS.to_string()),
        ];
        if let RelationshipType::Interacts { actor, .. } = &rel.kind {
            fields.push((key::ACTOR, escape(actor)));
        }
        fields.push((key::TARGET, escape(target)));
        relationship_common(rel, &mut fields)?;
        Ok(fields)
    }

    fn unshaped(&self, rel: &Relationship) -> Result<Option<String>, RenderError> {
        let name = match rel.kind {
            RelationshipType::ComposedOf { .. } => marker::COMPOSED_OF,
            _ => marker::RELATIONSHIP,
        };
        Ok(Some(marker_line(name, &json("relationship", rel)?)))
    }

    fn trailer(&self, arch: &Architecture) -> Result<String, RenderError> {
        let mut out = String::new();
        if !arch.controls.is_empty() {
            out.push_str("\n# Controls\n");
            for (id, control) in &arch.controls {
                let entry: BTreeMap<&str, &Control> = BTreeMap::from([(id.as_str(), control)]);
                out.push_str(&marker_line(marker::CONTROL, &json("control", &entry)?));
            }
        }
        if !arch.flows.is_empty() {
            out.push_str("\n# Flows\n");
            for flow in &arch.flows {
                let header = FlowHeader {
                    id: &flow.id,
                    name: &flow.name,
                };
                out.push_str(&marker_line(marker::FLOW, &json("flow", &header)?));
                let mut fields = Fields::new();
                push_text(&mut fields, key::DESCRIPTION, &flow.description);
                if !flow.metadata.is_empty() {
                    fields.push((key::METADATA, json("flow metadata", &flow.metadata)?));
                }
                for (k, v) in fields {
                    out.push_str(&field_line("", k, &v));
                }
                for transition in &flow.transitions {
                    out.push_str(&marker_line(marker::FLOW_STEP, &json("transition", transition)?));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;

    #[test]
    fn escapes_free_text_in_annotations() {
        let mut arch = Architecture::new("a", "A", "line one\nx=y");
        arch.define_node("n", NodeType::Service, "N", "").with_owner("team=core");

        let text = AnnotatedRenderer::default().render(&arch).unwrap();
        assert!(text.contains("# @calm:description=line one\\nx\\=y\n"));
        assert!(text.contains("  # @calm:owner=team\\=core\n"));
        assert!(text.contains("  # @calm:seq=0\n"));
    }

    #[test]
    fn unshaped_relationships_become_markers() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("s", NodeType::System, "S", "");
        arch.define_node("n", NodeType::Service, "N", "");
        arch.composed_of("s-n", "", "s", &["n"]);
        arch.interacts("lonely", "", "s", &[]);

        let text = AnnotatedRenderer::default().render(&arch).unwrap();
        assert!(text.contains("# @calm:composed-of {\"unique-id\":\"s-n\""));
        assert!(text.contains("# @calm:relationship {\"unique-id\":\"lonely\""));
    }

    #[test]
    fn interactions_emit_one_block_per_target() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("u", NodeType::Actor, "U", "");
        arch.define_node("x", NodeType::WebClient, "X", "");
        arch.define_node("y", NodeType::Service, "Y", "");
        arch.interacts("u-uses", "uses", "u", &["x", "y"]);

        let text = AnnotatedRenderer::default().render(&arch).unwrap();
        assert_eq!(text.matches("# @calm:type=interacts").count(), 2);
        assert!(text.contains("u -> x {\n  # @calm:id=u-uses\n"));
    }
}
