//! Record sources
//!
//! The engine hands each slice, with the request values its cursor produced,
//! to a `RecordSource` and gets records back.

use crate::cursor::{DatetimeBasedCursor, DatetimeCursorConfig, PartitionedCursor};
use crate::error::{Error, Result};
use crate::partition::{Partition, StreamSlice};
use crate::types::{JsonObject, JsonValue, StringMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Request values for one slice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceRequest {
    /// Query parameters
    pub params: StringMap,
    /// Headers
    pub headers: StringMap,
    /// Form body fields
    pub body_data: StringMap,
    /// JSON body fields
    pub body_json: JsonObject,
}

impl SliceRequest {
    /// Collect every request value the cursor injects for a slice
    pub fn for_slice(cursor: &dyn PartitionedCursor, slice: &StreamSlice) -> Self {
        Self {
            params: cursor.get_request_params(Some(slice)),
            headers: cursor.get_request_headers(Some(slice)),
            body_data: cursor.get_request_body_data(Some(slice)),
            body_json: cursor.get_request_body_json(Some(slice)),
        }
    }
}

/// Fetches the records of a slice
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Read every record of a slice
    async fn read_slice(&self, slice: &StreamSlice, request: &SliceRequest)
        -> Result<Vec<JsonValue>>;
}

// ============================================================================
// In-Memory Source
// ============================================================================

/// Serves recorded records, grouped by partition
///
/// A record group matches a slice when every key of the group's partition has
/// the same value in the slice's partition. With a window configured, only
/// records whose cursor value lies inside the slice's window are returned.
#[derive(Debug, Default)]
pub struct InMemorySource {
    groups: Vec<(Partition, Vec<JsonValue>)>,
    window: Option<DatetimeBasedCursor>,
    requests: Mutex<Vec<SliceRequest>>,
}

impl InMemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records for a partition
    #[must_use]
    pub fn with_records(mut self, partition: Partition, records: Vec<JsonValue>) -> Self {
        self.groups.push((partition, records));
        self
    }

    /// Filter records by the slice's cursor window
    #[must_use]
    pub fn with_window(mut self, config: DatetimeCursorConfig) -> Self {
        self.window = Some(DatetimeBasedCursor::new(config));
        self
    }

    /// Load record groups from `[{"partition": {...}, "records": [...]}]`
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        let groups = value
            .as_array()
            .ok_or_else(|| Error::config("Recorded records must be a JSON array"))?;

        let mut source = Self::new();
        for group in groups {
            let partition = match group.get("partition") {
                Some(partition) => Partition::from_value(partition)?,
                None => Partition::empty(),
            };
            let records = group
                .get("records")
                .and_then(JsonValue::as_array)
                .cloned()
                .ok_or_else(|| Error::config(format!("Record group has no `records` array: {group}")))?;
            source.groups.push((partition, records));
        }
        Ok(source)
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<SliceRequest> {
        self.requests.lock().await.clone()
    }

    fn in_window(&self, slice: &StreamSlice, record: &JsonValue) -> bool {
        let Some(window) = &self.window else {
            return true;
        };
        let config = window.config();
        let Some(at) = record
            .get(&config.cursor_field)
            .and_then(|v| window.parse_date(v))
        else {
            return true;
        };
        let bound = |key: &str| -> Option<DateTime<Utc>> {
            slice.cursor_slice.get(key).and_then(|v| window.parse_date(v))
        };
        bound(config.partition_field_start.as_str()).map_or(true, |start| at >= start)
            && bound(config.partition_field_end.as_str()).map_or(true, |end| at <= end)
    }
}

fn matches_partition(group: &Partition, slice: &Partition) -> bool {
    group
        .values()
        .iter()
        .all(|(key, value)| slice.get(key) == Some(value))
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn read_slice(
        &self,
        slice: &StreamSlice,
        request: &SliceRequest,
    ) -> Result<Vec<JsonValue>> {
        self.requests.lock().await.push(request.clone());

        Ok(self
            .groups
            .iter()
            .filter(|(partition, _)| matches_partition(partition, &slice.partition))
            .flat_map(|(_, records)| records.iter())
            .filter(|record| self.in_window(slice, record))
            .cloned()
            .collect())
    }
}
