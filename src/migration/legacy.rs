//! Legacy flat state → per-partition state
//!
//! ```json
//! {"13506132": {"last_changed": "2022-12-27T08:34:39+00:00"}}
//! ```
//! becomes
//! ```json
//! {"states": [{"partition": {"id": "13506132"}, "cursor": {"last_changed": "2022-12-27T08:34:39+00:00"}}]}
//! ```

use super::types::StateMigration;
use crate::error::{Error, Result};
use crate::partition::{ParentStreamConfig, Partition, PartitionRouter};
use crate::state::{PartitionState, RESERVED_STATE_KEYS, STATES_KEY};
use crate::types::{JsonObject, JsonValue};

/// Wraps a flat `{partition_id: {cursor_field: value}}` map into `states`
#[derive(Debug, Clone)]
pub struct LegacyToPerPartitionStateMigration {
    cursor_field: String,
    parent_configs: Vec<ParentStreamConfig>,
}

impl LegacyToPerPartitionStateMigration {
    /// Create a migration for a cursor field and the router's parent configs
    pub fn new(cursor_field: impl Into<String>, parent_configs: Vec<ParentStreamConfig>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            parent_configs,
        }
    }

    /// Create a migration for a router
    pub fn for_router(cursor_field: impl Into<String>, router: &dyn PartitionRouter) -> Self {
        Self::new(cursor_field, router.parent_stream_configs().to_vec())
    }

    /// Partition field of the single parent config
    fn partition_field(&self) -> Option<&str> {
        match self.parent_configs.as_slice() {
            [config] if !config.partition_field.is_empty() => Some(config.partition_field.as_str()),
            _ => None,
        }
    }

    fn is_legacy_entry(&self, key: &str, value: &JsonValue) -> bool {
        if RESERVED_STATE_KEYS.contains(&key) {
            return false;
        }
        match value {
            JsonValue::Object(cursor) => {
                cursor.len() == 1 && cursor.contains_key(&self.cursor_field)
            }
            _ => false,
        }
    }
}

impl StateMigration for LegacyToPerPartitionStateMigration {
    fn name(&self) -> &'static str {
        "legacy_to_per_partition"
    }

    fn should_migrate(&self, state: &JsonValue) -> bool {
        let Some(state) = state.as_object() else {
            return false;
        };
        self.partition_field().is_some()
            && !state.is_empty()
            && state.iter().all(|(k, v)| self.is_legacy_entry(k, v))
    }

    fn migrate(&self, state: &JsonValue) -> Result<JsonValue> {
        if !self.should_migrate(state) {
            return Err(Error::migration(
                self.name(),
                "state is not a flat map of partition ids to cursors",
            ));
        }
        let (Some(partition_field), Some(entries)) = (self.partition_field(), state.as_object())
        else {
            return Err(Error::migration(self.name(), "no single parent stream config"));
        };

        let states = entries
            .iter()
            .filter_map(|(id, cursor)| {
                let cursor: JsonObject = cursor.as_object()?.clone();
                let partition = Partition::empty().with_value(partition_field, id.as_str());
                Some(PartitionState::new(partition, cursor).to_value())
            })
            .collect();

        let mut migrated = JsonObject::new();
        migrated.insert(STATES_KEY.to_string(), JsonValue::Array(states));
        Ok(JsonValue::Object(migrated))
    }
}
