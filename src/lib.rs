// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Incremental
//!
//! Cursor and state engine for incremental reads of partitioned streams.
//!
//! ## Features
//!
//! - **Per-partition cursors**: Resume every partition where it left off
//! - **Global fallback**: Switch to a single cursor once a stream has too many partitions
//! - **Checkpoint safety**: The global cursor only advances after a full traversal
//! - **State migrations**: Upgrade legacy state shapes before a read
//! - **Interval state**: Convert sequential cursors into merged interval lists
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_incremental::engine::{InMemorySource, SyncEngine};
//! use solidafy_incremental::loader::{load_definition, ParentRecords};
//! use solidafy_incremental::state::StateManager;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_incremental::Result<()> {
//!     let def = load_definition("streams.yaml")?;
//!     let stream = def.stream("comments")?;
//!
//!     let router = stream.build_router(&ParentRecords::new());
//!     let migrations = stream.build_migrations(router.as_ref());
//!     let mut cursor = stream.build_cursor(router)?;
//!
//!     let mut engine = SyncEngine::new(StateManager::from_file("state.json")?);
//!     let source = InMemorySource::new();
//!     for message in engine.sync_stream(&mut cursor, &migrations, &source).await? {
//!         // Process messages
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                              │
//! │  seed (migrations) → next_slice → read → observe → close_slice  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                  PerPartitionWithGlobalCursor
//!                                │
//! ┌───────────────┬──────────────┴───────┬─────────────┬───────────┐
//! │ PerPartition  │  GlobalSubstream     │  Migration  │   State   │
//! ├───────────────┼──────────────────────┼─────────────┼───────────┤
//! │ cursor/part.  │ one cursor, commit   │ legacy      │ manager   │
//! │ ceiling       │ after full traversal │ parent_slice│ converter │
//! │               │ lookback window      │ flatten     │           │
//! └───────────────┴──────────────────────┴─────────────┴───────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Partition routing
pub mod partition;

/// Incremental cursors
pub mod cursor;

/// State documents, conversion and persistence
pub mod state;

/// State migrations
pub mod migration;

/// Main execution engine
pub mod engine;

/// YAML loader for stream definitions
pub mod loader;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use cursor::{PartitionedCursor, PerPartitionWithGlobalCursor};
pub use loader::{load_definition, load_definition_from_str, SyncDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
