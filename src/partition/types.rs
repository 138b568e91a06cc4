//! Partition types and traits
//!
//! Defines the core partition abstractions.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, RequestOption, RequestOptionType};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Key under which a substream partition references the slice of its parent
pub const PARENT_SLICE_KEY: &str = "parent_slice";

// ============================================================================
// Partition
// ============================================================================

/// An immutable partition key
///
/// Two partitions are equal when their values are structurally equal, regardless
/// of key order. The canonical form is computed once at construction.
#[derive(Clone, Default)]
pub struct Partition {
    values: JsonObject,
    key: String,
}

impl Partition {
    /// Create a partition from its values
    pub fn new(values: JsonObject) -> Self {
        let key = canonical_key(&values);
        Self { values, key }
    }

    /// The empty partition (used for global slices)
    pub fn empty() -> Self {
        Self::new(JsonObject::new())
    }

    /// Create a partition from a JSON value, which must be an object
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self::new(map.clone())),
            other => Err(Error::state(format!(
                "Partition must be a JSON object, got: {other}"
            ))),
        }
    }

    /// Add a value, returning a new partition
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        Self::new(self.values)
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(JsonValue::as_str)
    }

    /// All partition values
    pub fn values(&self) -> &JsonObject {
        &self.values
    }

    /// Canonical, order-independent key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the partition has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert back to a JSON object value
    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.values.clone())
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Partition {}

impl Hash for Partition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({})", self.key)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for Partition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Partition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        JsonObject::deserialize(deserializer).map(Self::new)
    }
}

/// Serialize an object with keys sorted at every level
fn canonical_key(values: &JsonObject) -> String {
    let mut out = String::new();
    write_canonical_object(values, &mut out);
    out
}

fn write_canonical_object(map: &JsonObject, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&JsonValue::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key.as_str()) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => write_canonical_object(map, out),
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

// ============================================================================
// Stream Slice
// ============================================================================

/// One bounded fetch unit: a partition plus the cursor window within it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSlice {
    /// Partition this slice belongs to
    pub partition: Partition,
    /// Cursor window (e.g. `start_time` / `end_time`)
    pub cursor_slice: JsonObject,
}

impl StreamSlice {
    /// Create a new slice
    pub fn new(partition: Partition, cursor_slice: JsonObject) -> Self {
        Self {
            partition,
            cursor_slice,
        }
    }

    /// Look up a key in the cursor window first, then in the partition
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.cursor_slice
            .get(key)
            .or_else(|| self.partition.get(key))
    }

    /// Flatten partition and cursor window into a single object
    pub fn to_value(&self) -> JsonValue {
        let mut merged = self.partition.values().clone();
        for (k, v) in &self.cursor_slice {
            merged.insert(k.clone(), v.clone());
        }
        JsonValue::Object(merged)
    }
}

// ============================================================================
// Parent Stream Config
// ============================================================================

/// How a substream derives partitions from one parent stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentStreamConfig {
    /// Name of the parent stream
    pub stream: String,
    /// Field to extract from parent records (dot notation for nesting)
    pub parent_key: String,
    /// Field name to use in partitions
    pub partition_field: String,
    /// Optional injection of the partition value into requests
    #[serde(default)]
    pub request_option: Option<RequestOption>,
    /// Whether the parent stream's state is persisted alongside the child's
    #[serde(default)]
    pub incremental_dependency: bool,
}

impl ParentStreamConfig {
    /// Create a new parent stream config
    pub fn new(
        stream: impl Into<String>,
        parent_key: impl Into<String>,
        partition_field: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            parent_key: parent_key.into(),
            partition_field: partition_field.into(),
            request_option: None,
            incremental_dependency: false,
        }
    }

    /// Inject the partition value into requests
    #[must_use]
    pub fn with_request_option(mut self, option: RequestOption) -> Self {
        self.request_option = Some(option);
        self
    }

    /// Persist the parent's state as part of the child's state
    #[must_use]
    pub fn with_incremental_dependency(mut self, enabled: bool) -> Self {
        self.incremental_dependency = enabled;
        self
    }
}

// ============================================================================
// Partition Router
// ============================================================================

/// Trait for partition routers
pub trait PartitionRouter: Send + Sync + fmt::Debug {
    /// Generate partitions, in a stable order
    fn partitions(&self) -> Result<Vec<Partition>>;

    /// State of the parent streams feeding this router (empty when none)
    fn stream_state(&self) -> JsonObject {
        JsonObject::new()
    }

    /// Request values this router injects for a partition
    fn request_options(&self, _option_type: RequestOptionType, _partition: &Partition) -> JsonObject {
        JsonObject::new()
    }

    /// Parent stream configs (empty for routers not backed by parent streams)
    fn parent_stream_configs(&self) -> &[ParentStreamConfig] {
        &[]
    }
}
