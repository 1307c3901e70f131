#![forbid(unsafe_code)]

//! Durable storage for configuration records.
//!
//! A record is a JSON object addressed by a configuration path such as
//! `/bilge/linear`. Paths always start with `/`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

use super::ConfigRecord;
use crate::error::StoreError;

/// External key-value backend.
pub trait ConfigStore {
    /// `Ok(None)` means there is no record at `path`.
    fn load(&self, path: &str) -> Result<Option<ConfigRecord>, StoreError>;
    fn save(&self, path: &str, record: &ConfigRecord) -> Result<(), StoreError>;
}

/// Split `/a/b` into `["a", "b"]`, rejecting anything that could escape a
/// storage root.
fn path_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let invalid = || StoreError::InvalidPath {
        path: path.to_owned(),
    };
    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    let segments: Vec<&str> = rest.split('/').collect();
    let bad = segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'));
    if bad {
        return Err(invalid());
    }
    Ok(segments)
}

// ─── In-memory store ─────────────────────────────────────────────────────────

/// Volatile store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Rc<RefCell<BTreeMap<String, ConfigRecord>>>,
    saves: Rc<Cell<u64>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record at `path`, bypassing validation.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<ConfigRecord> {
        self.records.borrow().get(path).cloned()
    }

    /// Seed a record directly, as if written by an earlier run.
    pub fn insert(&self, path: impl Into<String>, record: ConfigRecord) {
        self.records.borrow_mut().insert(path.into(), record);
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.get()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.records.borrow().keys().cloned().collect()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, path: &str) -> Result<Option<ConfigRecord>, StoreError> {
        path_segments(path)?;
        Ok(self.records.borrow().get(path).cloned())
    }

    fn save(&self, path: &str, record: &ConfigRecord) -> Result<(), StoreError> {
        path_segments(path)?;
        self.records
            .borrow_mut()
            .insert(path.to_owned(), record.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// ─── JSON file store ─────────────────────────────────────────────────────────

/// One pretty-printed `.json` file per configuration path under `root`.
///
/// `/bilge/linear` lives at `<root>/bilge/linear.json`. Writes go to a
/// sibling temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `path`.
    pub fn file_for(&self, path: &str) -> Result<PathBuf, StoreError> {
        let segments = path_segments(path)?;
        let mut file = self.root.clone();
        if let Some((last, parents)) = segments.split_last() {
            file.extend(parents);
            file.push(format!("{last}.json"));
        }
        Ok(file)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self, path: &str) -> Result<Option<ConfigRecord>, StoreError> {
        let file = self.file_for(path)?;
        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path: file, source }),
        };
        let value: Value = serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;
        match value {
            Value::Object(record) => Ok(Some(record)),
            _ => Err(StoreError::NotAnObject {
                path: path.to_owned(),
            }),
        }
    }

    fn save(&self, path: &str, record: &ConfigRecord) -> Result<(), StoreError> {
        let file = self.file_for(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_string_pretty(record).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &file).map_err(|source| StoreError::Io { path: file, source })?;
        tracing::debug!(path, "configuration saved");
        Ok(())
    }
}
