use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::patch::DeclarationSchema;
use crate::rules::{self, ValidationRule};
use crate::storage::{read_json, to_json, write_atomic};

/// User settings, stored as `settings.json` in the store directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Validation rules to run, by name. Empty means the default set.
    pub rules: Vec<String>,
    /// Shape of node declarations in program source.
    pub declaration: DeclarationSchema,
    /// D2 layout direction for rendered diagrams.
    pub diagram_direction: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            declaration: DeclarationSchema::default(),
            diagram_direction: "right".to_string(),
        }
    }
}

impl Settings {
    pub fn path(home: &Path) -> PathBuf {
        home.join("settings.json")
    }

    /// Settings from `home`, or defaults when the file is missing or unreadable.
    pub fn read(home: &Path) -> Self {
        let path = Self::path(home);
        if !path.exists() {
            return Self::default();
        }
        match read_json(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable settings");
                Self::default()
            }
        }
    }

    pub fn write(&self, home: &Path) -> Result<(), StorageError> {
        write_atomic(&Self::path(home), &to_json("settings", self)?)
    }

    /// The configured rule set. Unknown names are skipped with a warning.
    pub fn validation_rules(&self) -> Vec<&'static dyn ValidationRule> {
        if self.rules.is_empty() {
            return rules::default_rules();
        }
        self.rules
            .iter()
            .filter_map(|name| {
                let rule = rules::rule_by_name(name);
                if rule.is_none() {
                    tracing::warn!(rule = %name, "unknown validation rule");
                }
                rule
            })
            .collect()
    }
}
