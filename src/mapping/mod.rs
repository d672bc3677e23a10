//! Notification color mappings
//!
//! The mapping lives in an external key-value store as a JSON object of
//! app identifier to LED code, edited by the settings UI.

mod source;
mod store;

pub use source::{JsonFileSource, KeyValueSource};
#[cfg(test)]
pub use source::MemorySource;
pub use store::{MappingStore, DEFAULT_MAPPING_KEY};
