//! Incremental cursors
//!
//! Supports: Datetime, Per-partition, Global substream, Per-partition with global fallback
//!
//! # Overview
//!
//! A `StreamCursor` tracks how far a single stream has been synced. The
//! partitioned cursors wrap stream cursors so that a stream split into many
//! partitions can resume where each partition left off:
//!
//! - `PerPartitionCursor` keeps one stream cursor per partition.
//! - `GlobalSubstreamCursor` keeps one stream cursor for all partitions and
//!   only advances it after a full traversal.
//! - `PerPartitionWithGlobalCursor` starts per-partition and switches to the
//!   global cursor once the partition count exceeds its ceiling.

mod datetime;
mod global_substream;
mod per_partition;
mod per_partition_with_global;
mod types;

pub use datetime::{
    DatetimeBasedCursor, DatetimeCursorConfig, EPOCH_MILLIS_FORMAT, EPOCH_SECONDS_FORMAT,
};
pub(crate) use datetime::{format_with, parse_datetime, parse_duration, parse_with_format};
pub use global_substream::GlobalSubstreamCursor;
pub use per_partition::{PerPartitionCursor, DEFAULT_MAX_PARTITIONS_NUMBER};
pub use per_partition_with_global::PerPartitionWithGlobalCursor;
pub use types::{CursorFactory, CursorMode, PartitionedCursor, Record, StreamCursor};
