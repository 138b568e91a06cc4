//! Collapse a single-partition state to a flat cursor
//!
//! Streams that were once partitioned but only ever had one partition persist
//! `{"states": [{"partition": {...}, "cursor": {"updated_at": ...}}]}`; the
//! cursor is what they actually need.

use super::types::StateMigration;
use crate::error::{Error, Result};
use crate::state::STATES_KEY;
use crate::types::{JsonObject, JsonValue};

/// Unwraps `states[0].cursor` of a single-entry state
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenSinglePartitionStateMigration;

impl FlattenSinglePartitionStateMigration {
    /// Create the migration
    pub fn new() -> Self {
        Self
    }
}

/// The flat cursor of a single-entry `states` list
fn single_cursor(state: &JsonValue) -> Option<&JsonObject> {
    let [entry] = state.get(STATES_KEY)?.as_array()?.as_slice() else {
        return None;
    };
    let cursor = entry.get("cursor")?.as_object()?;
    let flat = !cursor.is_empty()
        && cursor
            .values()
            .all(|v| !matches!(v, JsonValue::Object(_) | JsonValue::Array(_)));
    flat.then_some(cursor)
}

impl StateMigration for FlattenSinglePartitionStateMigration {
    fn name(&self) -> &'static str {
        "flatten_single_partition"
    }

    fn should_migrate(&self, state: &JsonValue) -> bool {
        single_cursor(state).is_some()
    }

    fn migrate(&self, state: &JsonValue) -> Result<JsonValue> {
        single_cursor(state)
            .map(|cursor| JsonValue::Object(cursor.clone()))
            .ok_or_else(|| {
                Error::migration(self.name(), "state does not hold exactly one flat cursor")
            })
    }
}
