//! Diagram node positions, kept apart from the model so layout churn never
//! shows up as a model change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{read_json, to_json, write_atomic};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Layout {
    /// Position per node id.
    #[serde(default)]
    pub nodes: BTreeMap<String, Position>,
}

impl Layout {
    /// Drop positions for nodes that are no longer in `ids`.
    pub fn retain_nodes<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let keep: Vec<&str> = ids.into_iter().collect();
        self.nodes.retain(|id, _| keep.contains(&id.as_str()));
    }
}

/// Persistence for per-architecture layouts.
pub trait LayoutStore {
    /// The saved layout, or an empty one if nothing was saved yet.
    fn load(&self, architecture_id: &str) -> Result<Layout, StorageError>;
    fn save(&self, architecture_id: &str, layout: &Layout) -> Result<(), StorageError>;
}

/// Layouts as `<home>/layout/<id>.layout.json`.
#[derive(Debug, Clone)]
pub struct FsLayoutStore {
    dir: PathBuf,
}

impl FsLayoutStore {
    pub fn new(home: &Path) -> Self {
        Self {
            dir: home.join("layout"),
        }
    }

    fn path(&self, architecture_id: &str) -> PathBuf {
        self.dir.join(format!("{}.layout.json", architecture_id))
    }
}

impl LayoutStore for FsLayoutStore {
    fn load(&self, architecture_id: &str) -> Result<Layout, StorageError> {
        let path = self.path(architecture_id);
        if !path.exists() {
            return Ok(Layout::default());
        }
        read_json(&path)
    }

    fn save(&self, architecture_id: &str, layout: &Layout) -> Result<(), StorageError> {
        write_atomic(&self.path(architecture_id), &to_json("layout", layout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_layout_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsLayoutStore::new(tmp.path());
        assert_eq!(store.load("shop").unwrap(), Layout::default());
    }

    #[test]
    fn saved_layout_loads_back() {
        let tmp = TempDir::new().unwrap();
        let store = FsLayoutStore::new(tmp.path());
        let mut layout = Layout::default();
        layout.nodes.insert("api".into(), Position { x: 10.0, y: -4.5 });
        store.save("shop", &layout).unwrap();

        assert!(tmp.path().join("layout/shop.layout.json").exists());
        assert_eq!(store.load("shop").unwrap(), layout);
    }

    #[test]
    fn retain_drops_stale_nodes() {
        let mut layout = Layout::default();
        layout.nodes.insert("a".into(), Position::default());
        layout.nodes.insert("b".into(), Position::default());
        layout.retain_nodes(["b"]);
        assert_eq!(layout.nodes.keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
