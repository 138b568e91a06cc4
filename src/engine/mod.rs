//! Execution engine module
//!
//! Main read loop for one incremental stream.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Drives a cursor through its slices with state management
//! - `RecordSource` - Where the records of a slice come from
//! - `SyncConfig` - Configuration for sync operations
//! - Message types for output (Record, State, Log)

mod source;
mod types;

pub use source::{InMemorySource, RecordSource, SliceRequest};
pub use types::{Message, SyncConfig, SyncStats};

use crate::cursor::{PartitionedCursor, PerPartitionWithGlobalCursor, Record};
use crate::error::{Error, Result};
use crate::migration::MigrationChain;
use crate::partition::Partition;
use crate::state::StateManager;
use crate::types::JsonValue;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sync engine for incremental streams
#[derive(Debug)]
pub struct SyncEngine {
    /// State manager
    state: StateManager,
    /// Sync configuration
    config: SyncConfig,
    /// Statistics
    stats: SyncStats,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(state: StateManager) -> Self {
        Self {
            state,
            config: SyncConfig::default(),
            stats: SyncStats::default(),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Migrate the stream's stored state and seed the cursor with it
    pub async fn seed_cursor(
        &self,
        cursor: &mut PerPartitionWithGlobalCursor,
        migrations: &MigrationChain,
    ) -> Result<()> {
        let stream = cursor.stream().to_string();
        let stored = self.state.get_stream_state(&stream).await?;
        if stored.is_empty() {
            debug!(stream = %stream, "No stored state, starting from scratch");
            return Ok(());
        }

        let migrated = match migrations.apply(&JsonValue::Object(stored))? {
            JsonValue::Object(state) => state,
            other => {
                return Err(Error::state(format!(
                    "Migrated state for stream '{stream}' is not an object: {other}"
                )))
            }
        };
        cursor.set_initial_state(&migrated)
    }

    /// Sync one stream: seed, read every slice, checkpoint
    pub async fn sync_stream(
        &mut self,
        cursor: &mut PerPartitionWithGlobalCursor,
        migrations: &MigrationChain,
        source: &dyn RecordSource,
    ) -> Result<Vec<Message>> {
        let start = Instant::now();
        let stream = cursor.stream().to_string();
        let mut messages = Vec::new();

        messages.push(Message::info(format!("Starting sync for stream: {stream}")));

        self.seed_cursor(cursor, migrations).await?;
        cursor.start_slices_generation()?;

        let mut partitions = HashSet::new();
        let mut failed_partitions: HashSet<Partition> = HashSet::new();
        let mut slices_read = 0;
        loop {
            if self.config.max_slices > 0 && slices_read >= self.config.max_slices {
                info!(stream = %stream, slices = slices_read, "Slice limit reached, stopping early");
                messages.push(Message::warn(format!(
                    "Stopped {stream} after {slices_read} slices"
                )));
                break;
            }

            let Some(slice) = cursor.next_slice()? else {
                break;
            };

            // Windows after a failed one must not move the partition's cursor
            if failed_partitions.contains(&slice.partition) {
                debug!(stream = %stream, partition = %slice.partition, "Skipping slice after failure");
                continue;
            }

            let request = SliceRequest::for_slice(&*cursor, &slice);
            let values = match source.read_slice(&slice, &request).await {
                Ok(values) => values,
                Err(e) => {
                    // The slice stays open, so the global cursor cannot commit
                    self.stats.add_error();
                    messages.push(Message::error(format!(
                        "Error reading slice of partition {}: {e}",
                        slice.partition
                    )));
                    if self.config.fail_fast {
                        return Err(e);
                    }
                    warn!(
                        stream = %stream,
                        partition = %slice.partition,
                        error = %e,
                        "Slice failed, skipping the rest of its partition"
                    );
                    failed_partitions.insert(slice.partition.clone());
                    continue;
                }
            };

            let mut count = 0;
            for value in values {
                let record = Record::from_value(value, Some(slice.clone()));
                if !cursor.should_be_synced(&record) {
                    self.stats.add_skipped();
                    continue;
                }
                cursor.observe(&slice, &record)?;
                messages.push(Message::record(&stream, JsonValue::Object(record.data)));
                count += 1;
            }
            self.stats.add_records(count);

            cursor.close_slice(&slice)?;
            slices_read += 1;
            self.stats.add_slice();
            partitions.insert(slice.partition.clone());

            messages.push(Message::debug(format!(
                "Slice {slices_read} of partition {}: {count} records",
                slice.partition
            )));

            if self.config.emit_state_per_slice {
                let state = cursor.get_stream_state();
                self.state.set_stream_state(&stream, state.clone()).await?;
                messages.push(Message::state(&stream, JsonValue::Object(state)));
            }
        }

        let state = cursor.get_stream_state();
        self.state.set_stream_state(&stream, state.clone()).await?;
        self.state.checkpoint().await?;
        messages.push(Message::state(&stream, JsonValue::Object(state)));

        self.stats.partitions_synced = partitions.len();
        self.stats.set_duration(start.elapsed().as_millis() as u64);

        messages.push(Message::info(format!(
            "Completed sync for {stream}: {} records in {} slices",
            self.stats.records_synced, self.stats.slices_read
        )));

        Ok(messages)
    }
}

#[cfg(test)]
mod tests;
