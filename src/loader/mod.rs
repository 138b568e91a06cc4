//! YAML Loader module
//!
//! Parse stream definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `SyncDefinition` - Every incremental stream of a source
//! - `StreamDefinition` - Cursor, partition router and state migrations of one stream
//! - Builders turning definitions into cursors, routers and migration chains

mod builder;
mod parser;
mod types;

pub use builder::ParentRecords;
pub use parser::{load_definition, load_definition_from_str};
pub use types::{
    CursorDefinition, MigrationDefinition, PartitionRouterDefinition, StreamDefinition,
    SyncDefinition,
};
