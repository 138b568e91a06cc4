//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs.

use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-partition cursor states
pub const STATES_KEY: &str = "states";
/// Global cursor state
pub const STATE_KEY: &str = "state";
/// Which cursor is authoritative
pub const USE_GLOBAL_CURSOR_KEY: &str = "use_global_cursor";
/// State of the parent streams
pub const PARENT_STATE_KEY: &str = "parent_state";
/// Duration of the last full traversal, in seconds
pub const LOOKBACK_WINDOW_KEY: &str = "lookback_window";

/// Top-level keys that belong to the state document rather than to a cursor
pub const RESERVED_STATE_KEYS: [&str; 5] = [
    STATES_KEY,
    STATE_KEY,
    USE_GLOBAL_CURSOR_KEY,
    PARENT_STATE_KEY,
    LOOKBACK_WINDOW_KEY,
];

/// Copy of `state` without the document-level keys
pub fn strip_reserved_keys(state: &JsonObject) -> JsonObject {
    state
        .iter()
        .filter(|(k, _)| !RESERVED_STATE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ============================================================================
// Partition State
// ============================================================================

/// Cursor state of a single partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionState {
    /// The partition
    pub partition: Partition,
    /// Its cursor state
    #[serde(default)]
    pub cursor: JsonObject,
}

impl PartitionState {
    /// Create a new partition state
    pub fn new(partition: Partition, cursor: JsonObject) -> Self {
        Self { partition, cursor }
    }

    /// Parse one entry of a `states` list
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        let entry = value
            .as_object()
            .ok_or_else(|| Error::state(format!("Partition state must be an object: {value}")))?;
        let partition = entry
            .get("partition")
            .ok_or_else(|| Error::state(format!("Partition state has no `partition`: {value}")))
            .and_then(Partition::from_value)?;
        let cursor = match entry.get("cursor") {
            Some(JsonValue::Object(cursor)) => cursor.clone(),
            None | Some(JsonValue::Null) => JsonObject::new(),
            Some(other) => {
                return Err(Error::state(format!(
                    "Partition cursor must be an object, got: {other}"
                )))
            }
        };
        Ok(Self { partition, cursor })
    }

    /// Serialize to a `{partition, cursor}` object
    pub fn to_value(&self) -> JsonValue {
        let mut entry = JsonObject::new();
        entry.insert("partition".to_string(), self.partition.to_value());
        entry.insert("cursor".to_string(), JsonValue::Object(self.cursor.clone()));
        JsonValue::Object(entry)
    }
}

// ============================================================================
// Persisted Sync State
// ============================================================================

/// Typed view of the state document written for a partitioned stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSyncState {
    /// Per-partition states (absent once the global cursor is authoritative)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<PartitionState>>,

    /// Global cursor state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonObject>,

    /// Whether the global cursor is authoritative
    #[serde(default)]
    pub use_global_cursor: bool,

    /// Parent stream state (never serialized when empty)
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub parent_state: JsonObject,

    /// Duration of the last full traversal, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_window: Option<u64>,
}

impl PersistedSyncState {
    /// Parse a state document
    pub fn from_object(state: &JsonObject) -> Result<Self> {
        serde_json::from_value(JsonValue::Object(state.clone()))
            .map_err(|e| Error::state(format!("Malformed state document: {e}")))
    }

}

// ============================================================================
// Connector State
// ============================================================================

/// Complete state for a connector: one opaque document per stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorState {
    /// Per-stream state
    #[serde(default)]
    pub streams: HashMap<String, JsonValue>,
}

impl ConnectorState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&JsonValue> {
        self.streams.get(stream)
    }

    /// Get state for a stream as an object (empty when absent)
    pub fn stream_object(&self, stream: &str) -> Result<JsonObject> {
        match self.streams.get(stream) {
            None | Some(JsonValue::Null) => Ok(JsonObject::new()),
            Some(JsonValue::Object(map)) => Ok(map.clone()),
            Some(other) => Err(Error::state(format!(
                "State for stream '{stream}' must be an object, got: {other}"
            ))),
        }
    }

    /// Set state for a stream
    pub fn set_stream(&mut self, stream: &str, state: JsonValue) {
        self.streams.insert(stream.to_string(), state);
    }

    /// Remove state for a stream
    pub fn remove_stream(&mut self, stream: &str) -> Option<JsonValue> {
        self.streams.remove(stream)
    }

    /// Check if state is empty
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_connector_state_default() {
        let state = ConnectorState::new();
        assert!(state.is_empty());
        assert!(state.stream_object("users").unwrap().is_empty());
    }

    #[test]
    fn test_connector_state_streams() {
        let mut state = ConnectorState::new();
        state.set_stream("users", json!({"updated_at": "2024-01-01"}));

        assert_eq!(
            state.get_stream("users"),
            Some(&json!({"updated_at": "2024-01-01"}))
        );
        assert_eq!(state.stream_object("users").unwrap().len(), 1);

        state.set_stream("bad", json!([1, 2]));
        assert!(state.stream_object("bad").is_err());

        assert!(state.remove_stream("users").is_some());
        assert!(state.get_stream("users").is_none());
    }

    #[test]
    fn test_partition_state_from_value() {
        let entry = PartitionState::from_value(&json!({
            "partition": {"id": "1"},
            "cursor": {"updated_at": "2024-01-01"}
        }))
        .unwrap();
        assert_eq!(entry.partition.get_string("id"), Some("1"));
        assert_eq!(entry.cursor.get("updated_at"), Some(&json!("2024-01-01")));

        assert!(PartitionState::from_value(&json!({"cursor": {}})).is_err());
        assert!(PartitionState::from_value(&json!({"partition": "1"})).is_err());
        assert!(PartitionState::from_value(&json!({"partition": {}, "cursor": 5})).is_err());
    }

    #[test]
    fn test_persisted_state_rejects_malformed_document() {
        let doc = json!({"use_global_cursor": "yes"});
        let err = PersistedSyncState::from_object(doc.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::State { .. }));

        let doc = json!({"states": [{"partition": "1", "cursor": {}}]});
        assert!(PersistedSyncState::from_object(doc.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_persisted_state_parse() {
        let doc = json!({
            "use_global_cursor": false,
            "states": [{"partition": {"id": "1"}, "cursor": {"updated_at": "2024-01-01"}}],
            "state": {"updated_at": "2023-12-01"},
            "parent_state": {"projects": {"updated_at": "2024-01-01"}},
            "lookback_window": 12
        });
        let state = PersistedSyncState::from_object(doc.as_object().unwrap()).unwrap();

        assert!(!state.use_global_cursor);
        assert_eq!(state.lookback_window, Some(12));
        assert_eq!(state.state, Some(json!({"updated_at": "2023-12-01"}).as_object().unwrap().clone()));
        assert_eq!(state.parent_state.len(), 1);

        let states = state.states.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].partition.get_string("id"), Some("1"));
        assert_eq!(states[0].cursor.get("updated_at"), Some(&json!("2024-01-01")));
    }

    #[test]
    fn test_strip_reserved_keys() {
        let doc = json!({"updated_at": "2024-01-01", "use_global_cursor": true, "parent_state": {}});
        let stripped = strip_reserved_keys(doc.as_object().unwrap());
        assert_eq!(JsonValue::Object(stripped), json!({"updated_at": "2024-01-01"}));
    }
}
