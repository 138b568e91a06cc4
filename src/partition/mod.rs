//! Partition routing module
//!
//! Supports: Parent stream, List
//!
//! # Overview
//!
//! Partitions split a stream into logical subdivisions that each carry their own
//! incremental progress. Typical sources:
//! - Child resources that require a parent ID
//! - Static list of values (e.g., regions, accounts)

mod routers;
mod types;

pub use routers::{ListRouter, ParentRouter};
pub use types::{
    ParentStreamConfig, Partition, PartitionRouter, StreamSlice, PARENT_SLICE_KEY,
};

#[cfg(test)]
mod tests;
