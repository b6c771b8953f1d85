use serde::{Deserialize, Serialize};

/// Shape of a node declaration in program source.
///
/// Argument positions are named here rather than scattered as magic indices
/// through the patcher; if the builder DSL changes shape, this is the one
/// place to update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclarationSchema {
    /// Method or function that declares a node, e.g. `define_node`.
    pub call: String,
    pub id_argument: usize,
    pub type_argument: usize,
    pub name_argument: usize,
    pub description_argument: usize,
    /// Chained option call whose first argument is the owner.
    pub owner_option: String,
    /// Path prefix written before the node type variant, e.g. `NodeType::`.
    pub type_path: String,
    /// Case-insensitive substrings marking the construction entry point.
    pub entry_markers: Vec<String>,
}

impl Default for DeclarationSchema {
    fn default() -> Self {
        Self {
            call: "define_node".to_string(),
            id_argument: 0,
            type_argument: 1,
            name_argument: 2,
            description_argument: 3,
            owner_option: "with_owner".to_string(),
            type_path: "NodeType::".to_string(),
            entry_markers: vec![
                "build".to_string(),
                "define_nodes".to_string(),
                "definenodes".to_string(),
            ],
        }
    }
}

impl DeclarationSchema {
    /// Number of positional arguments a declaration must carry.
    pub fn arity(&self) -> usize {
        [
            self.id_argument,
            self.type_argument,
            self.name_argument,
            self.description_argument,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }

    pub fn is_entry_point(&self, function_name: &str) -> bool {
        let lower = function_name.to_ascii_lowercase();
        self.entry_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_ascii_lowercase()))
    }
}
