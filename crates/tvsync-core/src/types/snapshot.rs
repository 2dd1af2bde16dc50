//! Field snapshots for content-based invalidation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Projection of the fields of a cached object that decide its freshness
///
/// Stored alongside the entry at save time and compared against a freshly
/// fetched value later on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSnapshot(BTreeMap<String, Value>);

impl FieldSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tracked field (builder style)
    pub fn with(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(field, value);
        self
    }

    /// Add or replace a tracked field
    ///
    /// Values that cannot be represented as JSON are tracked as `null`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(field.into(), value);
    }

    /// Get a tracked field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Number of tracked fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no field is tracked
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of tracked fields
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fields whose value differs between the two snapshots
    ///
    /// A field present on only one side counts as changed.
    pub fn changed_fields(&self, other: &FieldSnapshot) -> Vec<String> {
        let mut changed: Vec<String> = self
            .0
            .iter()
            .filter(|(field, value)| other.0.get(*field) != Some(*value))
            .map(|(field, _)| field.clone())
            .collect();

        changed.extend(
            other
                .0
                .keys()
                .filter(|field| !self.0.contains_key(*field))
                .cloned(),
        );
        changed
    }
}
