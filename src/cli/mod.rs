//! CLI module
//!
//! Command-line interface for inspecting and replaying incremental streams.
//!
//! # Commands
//!
//! - `migrate` - Apply state migrations to stored state
//! - `slices` - List the slices a read would request
//! - `replay` - Read recorded records and checkpoint state
//! - `convert` - Convert state between sequential and interval shapes
//! - `validate` - Validate a stream definition

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, StateShape};
pub use runner::Runner;
