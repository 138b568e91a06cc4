//! Loader types
//!
//! Declarative stream definition types for YAML parsing.

use crate::migration::ParentReference;
use crate::partition::ParentStreamConfig;
use crate::types::RequestOption;
use serde::{Deserialize, Serialize};

// ============================================================================
// Definition File
// ============================================================================

/// Top-level definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncDefinition {
    /// Stream definitions
    pub streams: Vec<StreamDefinition>,
}

/// One incremental stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamDefinition {
    /// Stream name
    pub name: String,
    /// Cursor configuration
    pub cursor: CursorDefinition,
    /// Partition router
    pub partition_router: PartitionRouterDefinition,
    /// Migrations applied to incoming state, in order
    #[serde(default)]
    pub state_migrations: Vec<MigrationDefinition>,
    /// Override for the number of partitions tracked individually
    #[serde(default)]
    pub partition_limit: Option<usize>,
}

// ============================================================================
// Cursor Definition
// ============================================================================

/// Datetime cursor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CursorDefinition {
    /// Record field holding the cursor value
    pub cursor_field: String,
    /// Format of slice boundaries and cursor values
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    /// Extra formats accepted in records
    #[serde(default)]
    pub cursor_datetime_formats: Vec<String>,
    /// Earliest datetime to sync from
    pub start_datetime: String,
    /// Latest datetime to sync to (default: now)
    #[serde(default)]
    pub end_datetime: Option<String>,
    /// Window size (e.g., "7d", "1h")
    #[serde(default)]
    pub step: Option<String>,
    /// Smallest cursor unit, required with `step`
    #[serde(default)]
    pub cursor_granularity: Option<String>,
    /// How far to re-read behind the cursor
    #[serde(default)]
    pub lookback_window: Option<String>,
    /// Injection of the window start
    #[serde(default)]
    pub start_time_option: Option<RequestOption>,
    /// Injection of the window end
    #[serde(default)]
    pub end_time_option: Option<RequestOption>,
}

fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

// ============================================================================
// Partition Router Definition
// ============================================================================

/// Partition router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionRouterDefinition {
    /// Static list of values
    List {
        /// Values, one partition each
        values: Vec<String>,
        /// Field name for the value in the partition
        partition_field: String,
        /// Injection of the value into requests
        #[serde(default)]
        request_option: Option<RequestOption>,
    },
    /// Partitions from parent stream records
    Parent {
        /// Parent streams
        parent_stream_configs: Vec<ParentStreamConfig>,
    },
}

// ============================================================================
// Migration Definition
// ============================================================================

/// State migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationDefinition {
    /// Flat `{partition_id: cursor}` state to per-partition state
    LegacyToPerPartition,
    /// Add `parent_slice` to partitions that lack it
    ParentSlice {
        /// Where to derive the parent slice from
        #[serde(default)]
        parent_reference: Option<ParentReference>,
    },
    /// Single stored partition to a flat cursor
    FlattenSinglePartition,
}
