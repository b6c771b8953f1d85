//! On-disk model store.
//!
//! Models live as `<name>.calm.json` in one directory, next to an optional
//! `<name>.baseline.calm.json` snapshot of what a client last saw.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StorageError;
use crate::model::Architecture;

const MODEL_SUFFIX: &str = ".calm.json";
const BASELINE_SUFFIX: &str = ".baseline";

/// Environment variable overriding the store location.
pub const HOME_ENV: &str = "ARCHSYNC_HOME";

/// Resolve the store directory: `$ARCHSYNC_HOME`, else `~/.archsync/`.
pub fn default_home() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".archsync")
}

/// Write through a temp file and rename, so readers never see a torn file.
///
/// Also used for patched program source.
pub fn write_atomic(path: &Path, data: &str) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", file_name));
    fs::write(&tmp, data).map_err(|e| StorageError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let raw = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| StorageError::decode(path, e))
}

pub(crate) fn to_json<T: serde::Serialize>(what: &'static str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode { what, source })
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn open_default() -> Self {
        Self::new(default_home())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, MODEL_SUFFIX))
    }

    fn baseline_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", name, BASELINE_SUFFIX, MODEL_SUFFIX))
    }

    /// All model names (without suffix), sorted.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map_err(|e| StorageError::io(&self.dir, e))?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(MODEL_SUFFIX)
                    .filter(|n| !n.ends_with(BASELINE_SUFFIX) && !n.starts_with('.'))
                    .map(|n| n.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.model_path(name).exists()
    }

    pub fn read(&self, name: &str) -> Result<Architecture, StorageError> {
        read_json(&self.model_path(name))
    }

    pub fn write(&self, name: &str, model: &Architecture) -> Result<(), StorageError> {
        let json = to_json("model", model)?;
        debug!(name, "writing model");
        write_atomic(&self.model_path(name), &json)
    }

    /// Delete a model and its baseline. Missing files are not an error.
    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        for path in [self.model_path(name), self.baseline_path(name)] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
            }
        }
        Ok(())
    }

    pub fn save_baseline(&self, name: &str, model: &Architecture) -> Result<(), StorageError> {
        let json = to_json("baseline", model)?;
        write_atomic(&self.baseline_path(name), &json)
    }

    /// The last snapshot saved for `name`, if any. A corrupt snapshot counts
    /// as missing.
    pub fn read_baseline(&self, name: &str) -> Option<Architecture> {
        let path = self.baseline_path(name);
        if !path.exists() {
            return None;
        }
        read_json(&path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use tempfile::TempDir;

    fn sample() -> Architecture {
        let mut arch = Architecture::new("shop", "Shop", "");
        arch.define_node("api", NodeType::Service, "API", "");
        arch
    }

    #[test]
    fn write_read_list_delete() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("models"));
        assert!(store.list().unwrap().is_empty());

        store.write("shop", &sample()).unwrap();
        store.write("bank", &sample()).unwrap();
        store.save_baseline("shop", &sample()).unwrap();

        assert_eq!(store.list().unwrap(), vec!["bank", "shop"]);
        assert_eq!(store.read("shop").unwrap(), sample());
        assert_eq!(store.read_baseline("shop"), Some(sample()));
        assert_eq!(store.read_baseline("bank"), None);

        store.delete("shop").unwrap();
        assert!(!store.exists("shop"));
        assert_eq!(store.read_baseline("shop"), None);
        store.delete("shop").unwrap();
    }

    #[test]
    fn atomic_write_replaces_without_leftovers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("src").join("arch.rs");
        write_atomic(&path, "fn build() {}\n").unwrap();
        write_atomic(&path, "fn build() { todo() }\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fn build() { todo() }\n");
        let names: Vec<String> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["arch.rs"]);
    }

    #[test]
    fn reading_missing_model_reports_path() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path());
        let err = store.read("ghost").unwrap_err();
        assert!(matches!(err, StorageError::Io { ref path, .. } if path.ends_with("ghost.calm.json")));
    }

    #[test]
    fn corrupt_model_is_a_decode_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.calm.json"), "{not json").unwrap();
        let store = ModelStore::new(tmp.path());
        assert!(matches!(store.read("bad"), Err(StorageError::Decode { .. })));
    }
}
