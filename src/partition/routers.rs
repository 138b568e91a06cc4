//! Partition router implementations
//!
//! Each router handles a specific partitioning strategy.

use super::types::{Partition, PartitionRouter, ParentStreamConfig, PARENT_SLICE_KEY};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, RequestOption, RequestOptionType};
use std::collections::{HashMap, HashSet};

// ============================================================================
// List Router
// ============================================================================

/// List-based partition router
///
/// Creates partitions from a static list of values.
#[derive(Debug, Clone)]
pub struct ListRouter {
    /// List of partition values
    values: Vec<String>,
    /// Field name for partition
    partition_field: String,
    /// Optional injection of the value into requests
    request_option: Option<RequestOption>,
}

impl ListRouter {
    /// Create a new list router
    pub fn new(values: Vec<String>, partition_field: impl Into<String>) -> Self {
        Self {
            values,
            partition_field: partition_field.into(),
            request_option: None,
        }
    }

    /// Inject the partition value into requests
    #[must_use]
    pub fn with_request_option(mut self, option: RequestOption) -> Self {
        self.request_option = Some(option);
        self
    }
}

impl PartitionRouter for ListRouter {
    fn partitions(&self) -> Result<Vec<Partition>> {
        Ok(self
            .values
            .iter()
            .map(|v| Partition::empty().with_value(self.partition_field.clone(), v.clone()))
            .collect())
    }

    fn request_options(&self, option_type: RequestOptionType, partition: &Partition) -> JsonObject {
        let mut options = JsonObject::new();
        if let Some(option) = &self.request_option {
            if option.inject_into == option_type {
                if let Some(value) = partition.get(&self.partition_field) {
                    options.insert(option.field_name.clone(), value.clone());
                }
            }
        }
        options
    }
}

// ============================================================================
// Parent Router
// ============================================================================

/// Parent stream-based partition router
///
/// Creates one partition per distinct parent key, for every configured parent
/// stream. Partitions carry an empty `parent_slice` since parent records are
/// supplied already flattened.
#[derive(Debug, Clone, Default)]
pub struct ParentRouter {
    /// Parent stream configs, in partition order
    configs: Vec<ParentStreamConfig>,
    /// Records read from each parent stream
    parent_records: HashMap<String, Vec<JsonValue>>,
    /// Latest state of each parent stream
    parent_states: JsonObject,
}

impl ParentRouter {
    /// Create a new parent router
    pub fn new(configs: Vec<ParentStreamConfig>) -> Self {
        Self {
            configs,
            parent_records: HashMap::new(),
            parent_states: JsonObject::new(),
        }
    }

    /// Set the records read from a parent stream
    #[must_use]
    pub fn with_records(mut self, stream: impl Into<String>, records: Vec<JsonValue>) -> Self {
        self.parent_records.insert(stream.into(), records);
        self
    }

    /// Set the state reached by a parent stream
    #[must_use]
    pub fn with_parent_state(mut self, stream: impl Into<String>, state: JsonValue) -> Self {
        self.parent_states.insert(stream.into(), state);
        self
    }

    /// Replace the records read from a parent stream
    pub fn set_records(&mut self, stream: impl Into<String>, records: Vec<JsonValue>) {
        self.parent_records.insert(stream.into(), records);
    }
}

/// Extract a partition key from a record using dot notation
fn extract_key(record: &JsonValue, parent_key: &str) -> Option<String> {
    let mut current = record;
    for part in parent_key.split('.') {
        current = current.get(part)?;
    }

    match current {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl PartitionRouter for ParentRouter {
    fn partitions(&self) -> Result<Vec<Partition>> {
        let mut partitions = Vec::new();

        for config in &self.configs {
            if config.partition_field.is_empty() {
                return Err(Error::missing_field(format!(
                    "partition_field for parent stream '{}'",
                    config.stream
                )));
            }

            let Some(records) = self.parent_records.get(&config.stream) else {
                continue;
            };

            let mut seen = HashSet::new();
            for record in records {
                if let Some(key_value) = extract_key(record, &config.parent_key) {
                    // Deduplicate
                    if seen.insert(key_value.clone()) {
                        partitions.push(
                            Partition::empty()
                                .with_value(config.partition_field.clone(), key_value)
                                .with_value(PARENT_SLICE_KEY, JsonValue::Object(JsonObject::new())),
                        );
                    }
                }
            }
        }

        Ok(partitions)
    }

    fn stream_state(&self) -> JsonObject {
        self.configs
            .iter()
            .filter(|c| c.incremental_dependency)
            .filter_map(|c| {
                self.parent_states
                    .get(&c.stream)
                    .map(|state| (c.stream.clone(), state.clone()))
            })
            .collect()
    }

    fn request_options(&self, option_type: RequestOptionType, partition: &Partition) -> JsonObject {
        let mut options = JsonObject::new();
        for config in &self.configs {
            let Some(option) = &config.request_option else {
                continue;
            };
            if option.inject_into != option_type {
                continue;
            }
            if let Some(value) = partition.get(&config.partition_field) {
                options.insert(option.field_name.clone(), value.clone());
            }
        }
        options
    }

    fn parent_stream_configs(&self) -> &[ParentStreamConfig] {
        &self.configs
    }
}
