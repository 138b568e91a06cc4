//! State migrations
//!
//! Supports: Legacy flat → per-partition, Missing parent slice, Single partition → flat
//!
//! # Overview
//!
//! Persisted state outlives the code that wrote it. Before a cursor is
//! seeded, a stream's `MigrationChain` rewrites old state shapes into the
//! current one. Each migration recognises one shape and leaves every other
//! shape alone.

mod flatten;
mod legacy;
mod parent_slice;
mod types;

pub use flatten::FlattenSinglePartitionStateMigration;
pub use legacy::LegacyToPerPartitionStateMigration;
pub use parent_slice::{ParentReference, ParentSliceStateMigration};
pub use types::{MigrationChain, StateMigration};
