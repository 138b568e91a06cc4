//! Cursor contracts
//!
//! Two layers of cursors exist:
//! - `StreamCursor` tracks progress of a single, unpartitioned stream.
//! - `PartitionedCursor` is the uniform surface the requester sees, implemented
//!   by the per-partition cursor, the global substream cursor, and the
//!   orchestrator that switches between them.

use crate::error::Result;
use crate::partition::{Partition, StreamSlice};
use crate::types::{to_string_map, JsonObject, JsonValue, RequestOptionType, StringMap};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Record
// ============================================================================

/// A record observed during a sync, together with the slice it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record fields
    pub data: JsonObject,
    /// Slice the record was read from
    pub associated_slice: Option<StreamSlice>,
}

impl Record {
    /// Create a new record
    pub fn new(data: JsonObject, associated_slice: Option<StreamSlice>) -> Self {
        Self {
            data,
            associated_slice,
        }
    }

    /// Create a record from a JSON value; non-object values are wrapped as `{"value": ...}`
    pub fn from_value(value: JsonValue, associated_slice: Option<StreamSlice>) -> Self {
        let data = match value {
            JsonValue::Object(map) => map,
            other => {
                let mut map = JsonObject::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::new(data, associated_slice)
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    /// Partition of the associated slice, if any
    pub fn partition(&self) -> Option<&Partition> {
        self.associated_slice.as_ref().map(|s| &s.partition)
    }
}

// ============================================================================
// Stream Cursor
// ============================================================================

/// Progress tracking for a single stream (or a single partition of one)
pub trait StreamCursor: Send + fmt::Debug {
    /// Seed from persisted state
    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()>;

    /// Cursor windows to fetch, given the current state
    fn stream_slices(&self) -> Result<Vec<JsonObject>>;

    /// Record a value seen inside a cursor window
    fn observe(&mut self, cursor_slice: &JsonObject, record: &JsonObject) -> Result<()>;

    /// Advance the persisted cursor after a window has been fully read
    fn close_slice(&mut self, cursor_slice: &JsonObject) -> Result<()>;

    /// Persisted state (empty when nothing has been synced)
    fn get_stream_state(&self) -> JsonObject;

    /// Whether a record falls inside the current sync window
    fn should_be_synced(&self, record: &JsonObject) -> bool;

    /// Compare two records by cursor value
    fn is_greater_than_or_equal(&self, first: &JsonObject, second: &JsonObject) -> bool;

    /// Request values injected for a cursor window
    fn request_options(&self, option_type: RequestOptionType, cursor_slice: &JsonObject)
        -> JsonObject;

    /// Widen the lookback by the duration of the previous run
    fn set_runtime_lookback_window(&mut self, _seconds: u64) {}
}

/// Creates fresh stream cursors, one per partition
pub trait CursorFactory: Send + Sync {
    /// Create a new cursor with no state
    fn create(&self) -> Box<dyn StreamCursor>;
}

impl<F> CursorFactory for F
where
    F: Fn() -> Box<dyn StreamCursor> + Send + Sync,
{
    fn create(&self) -> Box<dyn StreamCursor> {
        self()
    }
}

// ============================================================================
// Partitioned Cursor
// ============================================================================

/// Uniform cursor surface used by the slice loop and the requester
pub trait PartitionedCursor {
    /// Slices to fetch for one partition
    fn generate_slices_from_partition(&mut self, partition: &Partition) -> Result<Vec<StreamSlice>>;

    /// Record observed within a slice
    fn observe(&mut self, slice: &StreamSlice, record: &Record) -> Result<()>;

    /// Slice fully read
    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()>;

    /// Persisted state document
    fn get_stream_state(&self) -> JsonObject;

    /// Seed from a persisted state document
    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()>;

    /// State used to build requests for a slice (`None` means no resume point)
    fn select_state(&self, slice: Option<&StreamSlice>) -> Option<JsonObject>;

    /// Whether a record falls inside its partition's sync window
    fn should_be_synced(&self, record: &Record) -> bool;

    /// Compare two records by cursor value
    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> Result<bool>;

    /// Request values injected for a slice
    fn request_options(&self, option_type: RequestOptionType, slice: Option<&StreamSlice>)
        -> JsonObject;

    /// Query parameters for a slice
    fn get_request_params(&self, slice: Option<&StreamSlice>) -> StringMap {
        to_string_map(&self.request_options(RequestOptionType::RequestParameter, slice))
    }

    /// Headers for a slice
    fn get_request_headers(&self, slice: Option<&StreamSlice>) -> StringMap {
        to_string_map(&self.request_options(RequestOptionType::Header, slice))
    }

    /// Form body fields for a slice
    fn get_request_body_data(&self, slice: Option<&StreamSlice>) -> StringMap {
        to_string_map(&self.request_options(RequestOptionType::BodyData, slice))
    }

    /// JSON body fields for a slice
    fn get_request_body_json(&self, slice: Option<&StreamSlice>) -> JsonObject {
        self.request_options(RequestOptionType::BodyJson, slice)
    }
}

/// Which cursor the orchestrator currently delegates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// One cursor per partition
    #[default]
    PerPartition,
    /// One cursor shared by all partitions
    Global,
}

impl CursorMode {
    /// Whether the global cursor is authoritative
    pub fn is_global(self) -> bool {
        matches!(self, Self::Global)
    }
}

/// Merge partition-level and cursor-level request options (cursor wins on conflict)
pub(crate) fn merge_options(mut base: JsonObject, overlay: JsonObject) -> JsonObject {
    for (k, v) in overlay {
        base.insert(k, v);
    }
    base
}
