//! Inject `parent_slice` into per-partition states
//!
//! Partitions persisted before parent-slice tracking have no `parent_slice`
//! key and would not match the partitions the router now produces.

use super::types::StateMigration;
use crate::error::{Error, Result};
use crate::partition::PARENT_SLICE_KEY;
use crate::state::STATES_KEY;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// Derives a parent reference from a URI-like partition field
///
/// With `field = "subresource_uri"`, `strip_segments = 2` and `suffix = ".json"`,
/// a partition `{"subresource_uri": "/v1/Accounts/AC1/Calls/CA1.json"}` gets
/// `parent_slice: {"subresource_uri": "/v1/Accounts/AC1.json", "parent_slice": {}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentReference {
    /// Partition field holding the resource path
    pub field: String,
    /// Trailing path segments to drop
    pub strip_segments: usize,
    /// Appended to the stripped path
    #[serde(default)]
    pub suffix: String,
}

impl ParentReference {
    /// Create a parent reference rule
    pub fn new(field: impl Into<String>, strip_segments: usize, suffix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            strip_segments,
            suffix: suffix.into(),
        }
    }

    /// Parent slice for a partition, if the partition carries the field
    fn derive(&self, partition: &JsonObject) -> Option<JsonObject> {
        let path = partition.get(&self.field)?.as_str()?;
        let segments: Vec<&str> = path.split('/').collect();
        if self.strip_segments >= segments.len() {
            return None;
        }
        let parent_path = segments[..segments.len() - self.strip_segments].join("/");

        let mut parent = JsonObject::new();
        parent.insert(
            self.field.clone(),
            JsonValue::String(format!("{parent_path}{}", self.suffix)),
        );
        parent.insert(PARENT_SLICE_KEY.to_string(), JsonValue::Object(JsonObject::new()));
        Some(parent)
    }
}

/// Adds a `parent_slice` to every partition that lacks one
#[derive(Debug, Clone, Default)]
pub struct ParentSliceStateMigration {
    parent_reference: Option<ParentReference>,
}

impl ParentSliceStateMigration {
    /// Inject an empty `parent_slice`
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive `parent_slice` from a resource path where possible
    #[must_use]
    pub fn with_parent_reference(mut self, reference: ParentReference) -> Self {
        self.parent_reference = Some(reference);
        self
    }

    fn parent_slice_for(&self, partition: &JsonObject) -> JsonObject {
        self.parent_reference
            .as_ref()
            .and_then(|reference| reference.derive(partition))
            .unwrap_or_default()
    }
}

/// Partition objects of a `states` list
fn partitions(state: &JsonValue) -> Option<impl Iterator<Item = &JsonObject>> {
    let entries = state.get(STATES_KEY)?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| entry.get("partition")?.as_object()),
    )
}

impl StateMigration for ParentSliceStateMigration {
    fn name(&self) -> &'static str {
        "parent_slice"
    }

    fn should_migrate(&self, state: &JsonValue) -> bool {
        partitions(state)
            .is_some_and(|mut partitions| partitions.any(|p| !p.contains_key(PARENT_SLICE_KEY)))
    }

    fn migrate(&self, state: &JsonValue) -> Result<JsonValue> {
        if !self.should_migrate(state) {
            return Err(Error::migration(
                self.name(),
                "no partition is missing a parent_slice",
            ));
        }

        let mut migrated = state.clone();
        if let Some(JsonValue::Array(entries)) = migrated.get_mut(STATES_KEY) {
            for entry in entries {
                let Some(JsonValue::Object(partition)) = entry.get_mut("partition") else {
                    continue;
                };
                if !partition.contains_key(PARENT_SLICE_KEY) {
                    let parent_slice = self.parent_slice_for(partition);
                    partition.insert(PARENT_SLICE_KEY.to_string(), JsonValue::Object(parent_slice));
                }
            }
        }
        Ok(migrated)
    }
}
