//! App identifier to LED code lookup

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error};

use super::source::KeyValueSource;

/// Key under which the mapping document is stored
pub const DEFAULT_MAPPING_KEY: &str = "flutter.notif_hex_map";

/// Reasons the mapping document could not be used
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping document {0} is not set")]
    Missing(String),

    #[error("mapping document {0} is empty")]
    Blank(String),

    #[error("mapping document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("mapping document is not a JSON object")]
    NotAnObject,
}

impl MappingError {
    /// Whether this is an ordinary "nothing configured" state
    pub fn is_unset(&self) -> bool {
        matches!(self, MappingError::Missing(_) | MappingError::Blank(_))
    }
}

/// Read-through view of the user's app to code mapping
///
/// Every lookup re-reads the document from the backing store; nothing is
/// cached between calls.
#[derive(Clone)]
pub struct MappingStore {
    source: Arc<dyn KeyValueSource>,
    key: String,
}

impl MappingStore {
    pub fn new(source: Arc<dyn KeyValueSource>, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }

    /// Read and parse the current mapping document
    pub fn read_mapping(&self) -> Result<Map<String, Value>, MappingError> {
        let raw = self
            .source
            .get_string(&self.key)
            .ok_or_else(|| MappingError::Missing(self.key.clone()))?;

        if raw.trim().is_empty() {
            return Err(MappingError::Blank(self.key.clone()));
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(MappingError::NotAnObject),
        }
    }

    /// Code configured for `app_id`
    ///
    /// Absent, blank, and malformed documents all read as "no code".
    pub fn lookup(&self, app_id: &str) -> Option<String> {
        let mapping = match self.read_mapping() {
            Ok(mapping) => mapping,
            Err(e) if e.is_unset() => {
                debug!(error = %e, "no mappings configured");
                return None;
            }
            Err(e) => {
                error!(error = %e, "mapping parse failed");
                return None;
            }
        };

        match mapping.get(app_id).and_then(code_text) {
            Some(code) if !code.trim().is_empty() => Some(code),
            _ => {
                debug!(app_id, "no mapping for app");
                None
            }
        }
    }
}

/// Text of a mapping value; scalars are taken as written
fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
