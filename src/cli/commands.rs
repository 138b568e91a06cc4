//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy incremental sync CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-incremental")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stream definition file (YAML or JSON)
    #[arg(short = 'c', long, global = true)]
    pub definition: Option<PathBuf>,

    /// State file (JSON)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Stream to operate on (defaults to the only stream of the definition)
    #[arg(long, global = true)]
    pub stream: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply the stream's state migrations and print the result
    Migrate,

    /// Print the slices a read would request
    Slices {
        /// Parent stream records (JSON object of stream name to records)
        #[arg(long)]
        parent_records: Option<PathBuf>,
    },

    /// Run a read against recorded records
    Replay {
        /// Recorded records (JSON array of {partition, records} groups)
        #[arg(long)]
        records: PathBuf,

        /// Parent stream records (JSON object of stream name to records)
        #[arg(long)]
        parent_records: Option<PathBuf>,

        /// Stop after this many slices
        #[arg(long)]
        max_slices: Option<usize>,

        /// Emit state after each slice
        #[arg(long)]
        state_per_slice: bool,

        /// Keep going when a slice fails
        #[arg(long)]
        no_fail_fast: bool,
    },

    /// Convert a stream state between sequential and interval shapes
    Convert {
        /// Target shape
        #[arg(long)]
        to: StateShape,

        /// Cursor field of the sequential state
        #[arg(long)]
        cursor_field: String,

        /// Cursor values are epoch integers rather than datetimes
        #[arg(long)]
        epoch: bool,
    },

    /// Validate the stream definition
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// State shape targeted by `convert`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StateShape {
    /// `{cursor_field: value}`
    Sequential,
    /// Merged interval list
    Concurrent,
}
