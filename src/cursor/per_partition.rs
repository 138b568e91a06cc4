//! Per-partition cursor
//!
//! Keeps one stream cursor for every partition the router produced, in the
//! order partitions were first seen.

use super::types::{merge_options, CursorFactory, PartitionedCursor, Record, StreamCursor};
use crate::error::{Error, Result};
use crate::partition::{Partition, PartitionRouter, StreamSlice};
use crate::state::{strip_reserved_keys, PartitionState, STATES_KEY, STATE_KEY};
use crate::types::{JsonObject, JsonValue, RequestOptionType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Number of tracked partitions above which the global cursor takes over
pub const DEFAULT_MAX_PARTITIONS_NUMBER: usize = 10_000;

/// Tracks a separate cursor per partition
pub struct PerPartitionCursor {
    factory: Arc<dyn CursorFactory>,
    router: Arc<dyn PartitionRouter>,
    cursors: Vec<(Partition, Box<dyn StreamCursor>)>,
    index: HashMap<Partition, usize>,
    /// State applied to partitions that have no entry of their own
    default_partition_state: JsonObject,
    max_partitions: usize,
}

impl PerPartitionCursor {
    /// Create a cursor with no tracked partitions
    pub fn new(factory: Arc<dyn CursorFactory>, router: Arc<dyn PartitionRouter>) -> Self {
        Self {
            factory,
            router,
            cursors: Vec::new(),
            index: HashMap::new(),
            default_partition_state: JsonObject::new(),
            max_partitions: DEFAULT_MAX_PARTITIONS_NUMBER,
        }
    }

    /// Override the partition ceiling
    pub fn with_partition_limit(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::invalid_value(
                "partition_limit",
                "must be greater than zero",
            ));
        }
        self.max_partitions = limit;
        Ok(self)
    }

    /// Partition ceiling
    pub fn partition_limit(&self) -> usize {
        self.max_partitions
    }

    /// Number of tracked partitions
    pub fn partition_count(&self) -> usize {
        self.cursors.len()
    }

    /// True once more partitions are tracked than the ceiling allows
    pub fn limit_reached(&self) -> bool {
        self.cursors.len() > self.max_partitions
    }

    /// Tracked partitions in first-seen order
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.cursors.iter().map(|(p, _)| p)
    }

    /// Snapshot of every tracked partition with a non-empty cursor state
    pub fn partition_states(&self) -> Vec<PartitionState> {
        self.cursors
            .iter()
            .filter_map(|(partition, cursor)| {
                let state = cursor.get_stream_state();
                (!state.is_empty()).then(|| PartitionState::new(partition.clone(), state))
            })
            .collect()
    }

    fn create_cursor(&self, state: &JsonObject) -> Result<Box<dyn StreamCursor>> {
        let mut cursor = self.factory.create();
        if !state.is_empty() {
            cursor.set_initial_state(state)?;
        }
        Ok(cursor)
    }

    fn insert(&mut self, partition: Partition, cursor: Box<dyn StreamCursor>) {
        if let Some(&idx) = self.index.get(&partition) {
            self.cursors[idx].1 = cursor;
        } else {
            self.index.insert(partition.clone(), self.cursors.len());
            self.cursors.push((partition, cursor));
        }
    }

    fn cursor_for(&self, partition: &Partition) -> Option<&dyn StreamCursor> {
        self.index
            .get(partition)
            .map(|&idx| self.cursors[idx].1.as_ref())
    }

    /// Cursor for a partition, created from the default state if unseen
    fn cursor_for_mut(&mut self, partition: &Partition) -> Result<&mut Box<dyn StreamCursor>> {
        let existing = self.index.get(partition).copied();
        let idx = match existing {
            Some(idx) => idx,
            None => {
                let cursor = self.create_cursor(&self.default_partition_state)?;
                debug!(partition = %partition, "Tracking new partition");
                self.insert(partition.clone(), cursor);
                self.cursors.len() - 1
            }
        };
        Ok(&mut self.cursors[idx].1)
    }

    /// Run `f` against the partition's cursor, or a fresh one if it is unseen
    fn with_cursor<T>(
        &self,
        partition: &Partition,
        f: impl FnOnce(&dyn StreamCursor) -> T,
    ) -> Result<T> {
        match self.cursor_for(partition) {
            Some(cursor) => Ok(f(cursor)),
            None => {
                let cursor = self.create_cursor(&self.default_partition_state)?;
                Ok(f(cursor.as_ref()))
            }
        }
    }
}

impl PartitionedCursor for PerPartitionCursor {
    fn generate_slices_from_partition(&mut self, partition: &Partition) -> Result<Vec<StreamSlice>> {
        let cursor_slices = self.cursor_for_mut(partition)?.stream_slices()?;
        Ok(cursor_slices
            .into_iter()
            .map(|cs| StreamSlice::new(partition.clone(), cs))
            .collect())
    }

    fn observe(&mut self, slice: &StreamSlice, record: &Record) -> Result<()> {
        self.cursor_for_mut(&slice.partition)?
            .observe(&slice.cursor_slice, &record.data)
    }

    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()> {
        self.cursor_for_mut(&slice.partition)?
            .close_slice(&slice.cursor_slice)
    }

    fn get_stream_state(&self) -> JsonObject {
        let states = self
            .partition_states()
            .iter()
            .map(PartitionState::to_value)
            .collect();
        let mut state = JsonObject::new();
        state.insert(STATES_KEY.to_string(), JsonValue::Array(states));
        state
    }

    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }

        match state.get(STATES_KEY) {
            Some(JsonValue::Array(entries)) => {
                for entry in entries {
                    let entry = PartitionState::from_value(entry)?;
                    let cursor = self.create_cursor(&entry.cursor)?;
                    self.insert(entry.partition, cursor);
                }
            }
            Some(other) => {
                return Err(Error::state(format!("`states` must be an array, got: {other}")));
            }
            None => {}
        }

        // Partitions without their own entry start from the global state, or
        // from a flat legacy state applied to every partition.
        if let Some(global) = state.get(STATE_KEY) {
            if let JsonValue::Object(global) = global {
                self.default_partition_state = global.clone();
            }
        } else if !state.contains_key(STATES_KEY) {
            self.default_partition_state = strip_reserved_keys(state);
        }

        debug!(
            partitions = self.cursors.len(),
            "Seeded per-partition cursor from state"
        );
        Ok(())
    }

    fn select_state(&self, slice: Option<&StreamSlice>) -> Option<JsonObject> {
        let slice = slice?;
        self.cursor_for(&slice.partition)
            .map(|cursor| cursor.get_stream_state())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        let Some(partition) = record.partition() else {
            return true;
        };
        self.with_cursor(partition, |cursor| cursor.should_be_synced(&record.data))
            .unwrap_or(true)
    }

    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> Result<bool> {
        let (Some(first_partition), Some(second_partition)) = (first.partition(), second.partition())
        else {
            return Err(Error::cursor(
                "Cannot compare records that are not associated with a slice",
            ));
        };
        if first_partition != second_partition {
            return Err(Error::cursor(format!(
                "Cannot compare records from different partitions: {first_partition} and {second_partition}"
            )));
        }
        self.with_cursor(first_partition, |cursor| {
            cursor.is_greater_than_or_equal(&first.data, &second.data)
        })
    }

    fn request_options(&self, option_type: RequestOptionType, slice: Option<&StreamSlice>) -> JsonObject {
        let Some(slice) = slice else {
            return JsonObject::new();
        };
        let partition_options = self.router.request_options(option_type, &slice.partition);
        let cursor_options = self
            .with_cursor(&slice.partition, |cursor| {
                cursor.request_options(option_type, &slice.cursor_slice)
            })
            .unwrap_or_default();
        merge_options(partition_options, cursor_options)
    }
}

impl fmt::Debug for PerPartitionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerPartitionCursor")
            .field("router", &self.router)
            .field("partitions", &self.cursors.len())
            .field("max_partitions", &self.max_partitions)
            .finish_non_exhaustive()
    }
}
