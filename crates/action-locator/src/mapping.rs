//! Field mapping: logical key to ordered strategies.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::LocatorError;
use crate::types::SelectorStrategy;

/// Immutable key → strategies table, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    entries: BTreeMap<String, Vec<SelectorStrategy>>,
}

impl FieldMapping {
    /// Builds the mapping from a parsed JSON object.
    ///
    /// `_comment*` keys and entries whose value is not an array are dropped.
    /// Non-string array items are ignored.
    pub fn from_value(value: &Value) -> Result<Self, LocatorError> {
        let object = value
            .as_object()
            .ok_or_else(|| LocatorError::InvalidMapping("mapping must be a JSON object".into()))?;

        let mut entries = BTreeMap::new();
        for (key, raw) in object {
            if key.starts_with("_comment") {
                continue;
            }
            let Some(items) = raw.as_array() else {
                debug!(key = %key, "dropping non-array mapping entry");
                continue;
            };
            let mut strategies = Vec::new();
            for item in items.iter().filter_map(Value::as_str) {
                strategies.extend(SelectorStrategy::parse(key, item)?);
            }
            entries.insert(key.clone(), strategies);
        }
        Ok(Self { entries })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LocatorError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| LocatorError::InvalidMapping(err.to_string()))?;
        Self::from_value(&value)
    }

    /// Adds or replaces one entry. Used to assemble mappings in code.
    pub fn with(mut self, key: &str, raw: &[&str]) -> Result<Self, LocatorError> {
        let mut strategies = Vec::new();
        for item in raw {
            strategies.extend(SelectorStrategy::parse(key, item)?);
        }
        self.entries.insert(key.to_string(), strategies);
        Ok(self)
    }

    /// Strategies for `key`, empty when the key is unmapped.
    pub fn strategies(&self, key: &str) -> &[SelectorStrategy] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
