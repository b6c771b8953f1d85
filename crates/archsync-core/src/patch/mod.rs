//! Source-patch engine.
//!
//! Applies model-level edits to program source that declares the model,
//! touching only the declaration statements involved. Declarations are found
//! by their literal id; the engine never reconstructs a model from source.
//!
//! Every operation either returns the fully patched text or an error. There
//! is no partially patched output: edits are planned against a parsed view,
//! applied to a private copy, and the copy is only handed back on success.

mod rust;
mod schema;
mod syntax;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use rust::RustSyntax;
pub use schema::DeclarationSchema;
pub use syntax::{Argument, Declaration, NewDeclaration, SourceSyntax, TextEdit};

use crate::error::{InvalidValue, PatchError};
use crate::model::{Architecture, NodeType};

/// A node property that can be rewritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeProperty {
    Name,
    Description,
    Owner,
}

impl NodeProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeProperty::Name => "name",
            NodeProperty::Description => "description",
            NodeProperty::Owner => "owner",
        }
    }
}

impl fmt::Display for NodeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeProperty {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(NodeProperty::Name),
            "description" => Ok(NodeProperty::Description),
            "owner" => Ok(NodeProperty::Owner),
            _ => Err(InvalidValue::new(
                "node property",
                s,
                "name, description, owner",
            )),
        }
    }
}

/// A model-level edit to apply to program source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SourceEdit {
    /// Bring the source's node declarations in line with a whole model.
    Sync { model: Architecture },
    Add {
        id: String,
        #[serde(rename = "type")]
        node_type: NodeType,
        name: String,
        #[serde(default)]
        description: String,
    },
    Update {
        id: String,
        property: NodeProperty,
        value: String,
    },
    Delete { id: String },
}

/// Applies [`SourceEdit`]s through a [`SourceSyntax`] backend.
#[derive(Debug, Clone)]
pub struct SourcePatcher<S = RustSyntax> {
    syntax: S,
}

impl Default for SourcePatcher<RustSyntax> {
    fn default() -> Self {
        Self::new(DeclarationSchema::default())
    }
}

impl SourcePatcher<RustSyntax> {
    pub fn new(schema: DeclarationSchema) -> Self {
        Self {
            syntax: RustSyntax::new(schema),
        }
    }
}

impl<S: SourceSyntax> SourcePatcher<S> {
    pub fn with_syntax(syntax: S) -> Self {
        Self { syntax }
    }

    pub fn apply(&self, source: &str, edit: &SourceEdit) -> Result<String, PatchError> {
        match edit {
            SourceEdit::Sync { model } => self.sync(source, model),
            SourceEdit::Add {
                id,
                node_type,
                name,
                description,
            } => self.add(
                source,
                &NewDeclaration {
                    id,
                    node_type: *node_type,
                    name,
                    description,
                },
            ),
            SourceEdit::Update {
                id,
                property,
                value,
            } => self.update(source, id, *property, value),
            SourceEdit::Delete { id } => self.delete(source, id),
        }
    }

    pub fn add(&self, source: &str, node: &NewDeclaration<'_>) -> Result<String, PatchError> {
        if self
            .syntax
            .declarations(source)?
            .iter()
            .any(|d| d.id == node.id)
        {
            return Err(PatchError::DuplicateDeclaration(node.id.to_string()));
        }
        debug!(id = node.id, "adding declaration");
        self.syntax.insert_declaration(source, node)?.apply(source)
    }

    pub fn update(
        &self,
        source: &str,
        id: &str,
        property: NodeProperty,
        value: &str,
    ) -> Result<String, PatchError> {
        let declaration = self.syntax.locate_declaration(source, id)?;
        debug!(id, %property, "updating declaration");
        let schema = self.syntax.schema();
        let edit = match property {
            NodeProperty::Name => self.syntax.rewrite_argument(
                source,
                &declaration,
                "name",
                schema.name_argument,
                value,
            )?,
            NodeProperty::Description => self.syntax.rewrite_argument(
                source,
                &declaration,
                "description",
                schema.description_argument,
                value,
            )?,
            NodeProperty::Owner => self.syntax.set_owner(source, &declaration, value)?,
        };
        edit.apply(source)
    }

    pub fn delete(&self, source: &str, id: &str) -> Result<String, PatchError> {
        let declaration = self.syntax.locate_declaration(source, id)?;
        debug!(id, "removing declaration");
        self.syntax.remove_statement(source, &declaration)?.apply(source)
    }

    /// Reconcile the source with `model`: update declared nodes, add missing
    /// ones, remove ids the model no longer has.
    ///
    /// Only name and description are reconciled, and an empty incoming value
    /// leaves the source argument alone. Running the same sync twice is a
    /// no-op the second time.
    pub fn sync(&self, source: &str, model: &Architecture) -> Result<String, PatchError> {
        self.sync_report(source, model).map(|outcome| outcome.source)
    }

    /// [`SourcePatcher::sync`], also listing every declaration it touched.
    pub fn sync_report(&self, source: &str, model: &Architecture) -> Result<SyncOutcome, PatchError> {
        let mut text = source.to_string();
        let mut changes = Vec::new();

        let mut leftover: Vec<String> = Vec::new();
        for declaration in self.syntax.declarations(&text)? {
            if !leftover.contains(&declaration.id) {
                leftover.push(declaration.id);
            }
        }
        let mut declared: HashSet<String> = leftover.iter().cloned().collect();

        let schema = self.syntax.schema().clone();
        for node in &model.nodes {
            leftover.retain(|id| id != &node.id);
            if !declared.contains(&node.id) {
                text = self.add(
                    &text,
                    &NewDeclaration {
                        id: &node.id,
                        node_type: node.node_type,
                        name: &node.name,
                        description: &node.description,
                    },
                )?;
                declared.insert(node.id.clone());
                changes.push(SyncChange::Added {
                    id: node.id.clone(),
                    node_type: node.node_type,
                    name: node.name.clone(),
                });
                continue;
            }

            let slots = [
                (NodeProperty::Name, schema.name_argument, &node.name),
                (NodeProperty::Description, schema.description_argument, &node.description),
            ];
            for (property, index, value) in slots {
                if value.is_empty() {
                    continue;
                }
                let slot = property.as_str();
                let declaration = self.syntax.locate_declaration(&text, &node.id)?;
                let current = declaration.argument(slot, index)?;
                if current.value.as_deref() == Some(value.as_str()) {
                    continue;
                }
                debug!(id = %node.id, slot, "syncing argument");
                let before = current.value.clone();
                text = self
                    .syntax
                    .rewrite_argument(&text, &declaration, slot, index, value)?
                    .apply(&text)?;
                changes.push(SyncChange::Updated {
                    id: node.id.clone(),
                    property,
                    before,
                    after: value.clone(),
                });
            }
        }

        for id in leftover {
            text = self.delete(&text, &id)?;
            changes.push(SyncChange::Removed { id });
        }
        Ok(SyncOutcome {
            source: text,
            changes,
        })
    }
}

/// Patched source plus what a sync changed, in the order it was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub source: String,
    pub changes: Vec<SyncChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncChange {
    Added {
        id: String,
        node_type: NodeType,
        name: String,
    },
    /// `before` is `None` when the old argument was not a plain literal.
    Updated {
        id: String,
        property: NodeProperty,
        before: Option<String>,
        after: String,
    },
    Removed {
        id: String,
    },
}

impl fmt::Display for SyncChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncChange::Added {
                id,
                node_type,
                name,
            } => write!(f, "+ {} \"{}\" ({})", id, name, node_type),
            SyncChange::Updated {
                id,
                property,
                before: Some(before),
                after,
            } => write!(f, "~ {} {}: {:?} -> {:?}", id, property, before, after),
            SyncChange::Updated {
                id,
                property,
                before: None,
                after,
            } => write!(f, "~ {} {}: -> {:?}", id, property, after),
            SyncChange::Removed { id } => write!(f, "- {}", id),
        }
    }
}

/// Apply one edit with the default Rust backend and declaration schema.
pub fn apply_source_edit(source: &str, edit: &SourceEdit) -> Result<String, PatchError> {
    SourcePatcher::default().apply(source, edit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"use archsync_core::prelude::*;

pub fn build_architecture() -> Architecture {
    let mut arch = Architecture::new("shop", "Shop", "");

    // Edge services
    arch.define_node("n1", NodeType::Service, "Old Name", "Handles orders")
        .with_meta("tier", json!(1));
    arch.define_node("n2", NodeType::Database, "Store", "Rows")
        .with_owner("data");

    arch.connect("n1-n2", "", "n1", "n2");

    arch
}
"#;

    fn update(id: &str, property: NodeProperty, value: &str) -> SourceEdit {
        SourceEdit::Update {
            id: id.to_string(),
            property,
            value: value.to_string(),
        }
    }

    #[test]
    fn update_name_touches_only_that_argument() {
        let patched =
            apply_source_edit(SOURCE, &update("n1", NodeProperty::Name, "New Name")).unwrap();
        let expected = SOURCE.replace("\"Old Name\"", "\"New Name\"");
        assert_eq!(patched, expected);
    }

    #[test]
    fn update_description_escapes_value() {
        let patched = apply_source_edit(
            SOURCE,
            &update("n2", NodeProperty::Description, "say \"hi\"\n"),
        )
        .unwrap();
        assert!(patched.contains(r#""Store", "say \"hi\"\n")"#));
    }

    #[test]
    fn owner_is_rewritten_or_chained() {
        let patched = apply_source_edit(SOURCE, &update("n2", NodeProperty::Owner, "dba")).unwrap();
        assert!(patched.contains(".with_owner(\"dba\");"));
        assert!(!patched.contains("\"data\""));

        let patched = apply_source_edit(SOURCE, &update("n1", NodeProperty::Owner, "edge")).unwrap();
        assert!(patched.contains(
            "\"Handles orders\").with_owner(\"edge\")\n        .with_meta(\"tier\", json!(1));"
        ));
    }

    #[test]
    fn delete_missing_id_is_an_error() {
        let err = apply_source_edit(
            SOURCE,
            &SourceEdit::Delete {
                id: "ghost".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::DeclarationNotFound(id) if id == "ghost"));
    }

    #[test]
    fn delete_removes_whole_statement() {
        let patched = apply_source_edit(
            SOURCE,
            &SourceEdit::Delete {
                id: "n2".to_string(),
            },
        )
        .unwrap();
        assert!(!patched.contains("\"n2\", NodeType"));
        assert!(!patched.contains("with_owner"));
        assert!(patched.contains("        .with_meta(\"tier\", json!(1));\n\n    arch.connect"));
    }

    #[test]
    fn add_rejects_declared_id_and_inserts_new_one() {
        let add = |id: &str| SourceEdit::Add {
            id: id.to_string(),
            node_type: NodeType::Queue,
            name: "Events".to_string(),
            description: String::new(),
        };
        let err = apply_source_edit(SOURCE, &add("n1")).unwrap_err();
        assert!(matches!(err, PatchError::DuplicateDeclaration(_)));

        let patched = apply_source_edit(SOURCE, &add("events")).unwrap();
        assert!(patched.ends_with(
            "    arch.define_node(\"events\", NodeType::Queue, \"Events\", \"\");\n    arch\n}\n"
        ));
    }

    #[test]
    fn ambiguous_declarations_are_refused() {
        let source = "fn build(arch: &mut Architecture) {\n    arch.define_node(\"a\", NodeType::Service, \"A\", \"\");\n    arch.define_node(\"a\", NodeType::Service, \"B\", \"\");\n}\n";
        let err = apply_source_edit(source, &update("a", NodeProperty::Name, "C")).unwrap_err();
        assert!(matches!(err, PatchError::AmbiguousDeclaration { count: 2, .. }));
    }

    #[test]
    fn sync_updates_adds_deletes_and_is_idempotent() {
        let mut model = Architecture::new("shop", "Shop", "");
        model.define_node("n1", NodeType::Service, "Orders", "");
        model.define_node("cache", NodeType::Database, "Cache", "Hot rows");

        let edit = SourceEdit::Sync { model };
        let once = apply_source_edit(SOURCE, &edit).unwrap();
        assert!(once.contains("\"n1\", NodeType::Service, \"Orders\", \"Handles orders\")"));
        assert!(once.contains("arch.define_node(\"cache\", NodeType::Database, \"Cache\", \"Hot rows\");"));
        assert!(!once.contains("\"n2\", NodeType"));
        assert!(once.contains("// Edge services"));

        let twice = apply_source_edit(&once, &edit).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sync_report_lists_changes_in_order() {
        let mut model = Architecture::new("shop", "Shop", "");
        model.define_node("n1", NodeType::Service, "Orders", "");
        model.define_node("cache", NodeType::Database, "Cache", "");

        let patcher = SourcePatcher::default();
        let outcome = patcher.sync_report(SOURCE, &model).unwrap();
        assert_eq!(outcome.source, patcher.sync(SOURCE, &model).unwrap());
        let lines: Vec<String> = outcome.changes.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "~ n1 name: \"Old Name\" -> \"Orders\"",
                "+ cache \"Cache\" (database)",
                "- n2",
            ]
        );

        let again = patcher.sync_report(&outcome.source, &model).unwrap();
        assert!(again.changes.is_empty());
        assert_eq!(again.source, outcome.source);
    }

    #[test]
    fn property_parsing() {
        assert_eq!("Owner".parse::<NodeProperty>().unwrap(), NodeProperty::Owner);
        assert!("colour".parse::<NodeProperty>().is_err());
    }

    #[test]
    fn edits_decode_from_tagged_json() {
        let edit: SourceEdit = serde_json::from_str(
            r#"{"op": "add", "id": "q", "type": "queue", "name": "Q"}"#,
        )
        .unwrap();
        assert!(matches!(
            edit,
            SourceEdit::Add { node_type: NodeType::Queue, ref description, .. } if description.is_empty()
        ));
    }
}
