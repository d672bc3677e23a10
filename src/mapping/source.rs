//! Key-value stores the daemon reads settings from

use std::collections::HashMap;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::RwLock;

use serde_json::Value;
use tracing::{debug, error, warn};

/// Failures while reading a key-value file
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read-only string-valued settings store
pub trait KeyValueSource: Send + Sync + 'static {
    /// Current value stored under `key`, if any
    fn get_string(&self, key: &str) -> Option<String>;
}

/// Settings persisted as a flat JSON object in a file
///
/// The file is re-read on every lookup so external edits are seen
/// immediately. A missing file holds no keys.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the whole document; `Ok(None)` when the file does not exist
    pub fn load(&self) -> Result<Option<HashMap<String, Value>>, SourceError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SourceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}

impl KeyValueSource for JsonFileSource {
    fn get_string(&self, key: &str) -> Option<String> {
        let document = match self.load() {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!(path = ?self.path, "settings file not found");
                return None;
            }
            Err(e @ SourceError::Parse { .. }) => {
                error!(error = %e, "settings file is corrupt");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "settings file unreadable");
                return None;
            }
        };

        match document.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => {
                warn!(key, value = %other, "setting is not a string");
                None
            }
        }
    }
}

/// In-process store for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySource {
    values: RwLock<HashMap<String, String>>,
}

#[cfg(test)]
impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

#[cfg(test)]
impl KeyValueSource for MemorySource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}
