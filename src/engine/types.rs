//! Engine types
//!
//! Message types and configuration for the sync engine.

use crate::types::{JsonValue, LogLevel};
use serde::Serialize;

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    /// A record read from a slice
    Record {
        /// Stream name
        stream: String,
        /// Record data
        data: JsonValue,
    },
    /// State checkpoint
    State {
        /// Stream name
        stream: String,
        /// The stream's state document
        data: JsonValue,
    },
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
}

impl Message {
    /// Create a record message
    pub fn record(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::Record {
            stream: stream.into(),
            data,
        }
    }

    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a debug log
    pub fn debug(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Debug, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Record data, if this is a record message
    pub fn as_record(&self) -> Option<&JsonValue> {
        match self {
            Self::Record { data, .. } => Some(data),
            _ => None,
        }
    }

    /// State data, if this is a state message
    pub fn as_state(&self) -> Option<&JsonValue> {
        match self {
            Self::State { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Configuration for sync operation
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether to emit and store state after each slice
    pub emit_state_per_slice: bool,
    /// Stop after this many slices (0 = unlimited)
    pub max_slices: usize,
    /// Whether to fail fast on errors
    pub fail_fast: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            emit_state_per_slice: false,
            max_slices: 0,
            fail_fast: true,
        }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit state after each slice
    #[must_use]
    pub fn with_state_per_slice(mut self, emit: bool) -> Self {
        self.emit_state_per_slice = emit;
        self
    }

    /// Set max slices
    #[must_use]
    pub fn with_max_slices(mut self, max: usize) -> Self {
        self.max_slices = max;
        self
    }

    /// Set fail fast mode
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records emitted
    pub records_synced: usize,
    /// Records outside the sync window
    pub records_skipped: usize,
    /// Slices read and closed
    pub slices_read: usize,
    /// Distinct partitions read
    pub partitions_synced: usize,
    /// Errors encountered
    pub errors: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records
    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    /// Add a skipped record
    pub fn add_skipped(&mut self) {
        self.records_skipped += 1;
    }

    /// Add a slice
    pub fn add_slice(&mut self) {
        self.slices_read += 1;
    }

    /// Add an error
    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
