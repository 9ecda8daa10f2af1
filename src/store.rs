//!
//! Persisted-state store.
//!
//! Processes keep cross-cycle state in an explicit key/value store instead of
//! stashing it on shared entities. The kernel calls [`StateStore::load`] before
//! and [`StateStore::save`] after every tick; what those do is up to the
//! implementation.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::KernelError;
use crate::types::Cycle;

pub trait StateStore {
    /// Called once at the start of each cycle.
    fn load(&mut self, _cycle: Cycle) -> Result<(), KernelError> {
        Ok(())
    }

    /// Called once at the end of each cycle.
    fn save(&mut self, _cycle: Cycle) -> Result<(), KernelError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<&Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;
}

/// In-memory store; state lives as long as the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    entries: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }
}

/// Store backed by a JSON object file. The file is read on the first load
/// (a missing file means empty state) and rewritten on save when anything
/// changed.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Map<String, Value>,
    loaded: bool,
    dirty: bool,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into(), entries: Map::new(), loaded: false, dirty: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&mut self, _cycle: Cycle) -> Result<(), KernelError> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(KernelError::Store(format!("Cannot read {}: {}", self.path.display(), e)))
            }
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(entries) => {
                // Writes made before the first load win over the file.
                for (key, value) in entries {
                    self.entries.entry(key).or_insert(value);
                }
                Ok(())
            }
            other => Err(KernelError::Store(format!(
                "{} must hold a JSON object, found {}",
                self.path.display(),
                other
            ))),
        }
    }

    fn save(&mut self, cycle: Cycle) -> Result<(), KernelError> {
        if !self.dirty {
            return Ok(());
        }
        let raw = serde_json::to_string(&self.entries)?;
        std::fs::write(&self.path, raw)
            .map_err(|e| KernelError::Store(format!("Cannot write {}: {}", self.path.display(), e)))?;
        self.dirty = false;
        tracing::trace!(cycle, path = %self.path.display(), "State saved");
        Ok(())
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_owned(), value);
        self.dirty = true;
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        self.dirty |= removed.is_some();
        removed
    }
}
