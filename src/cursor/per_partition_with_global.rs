//! Per-partition cursor with a global fallback
//!
//! Tracks progress per partition until the number of partitions exceeds the
//! ceiling, then switches permanently to a single global cursor. The global
//! cursor is kept up to date the whole time so the switch loses nothing.
//!
//! # Slice generation
//!
//! Slices are pulled one at a time:
//!
//! ```text
//! cursor.start_slices_generation()?;
//! while let Some(slice) = cursor.next_slice()? {
//!     // read, observe, close_slice
//! }
//! ```
//!
//! Slices for a partition are generated from whichever cursor is active when
//! the traversal reaches that partition, so a mid-run switch takes effect for
//! the partitions that follow.

use super::global_substream::GlobalSubstreamCursor;
use super::per_partition::PerPartitionCursor;
use super::types::{CursorFactory, CursorMode, PartitionedCursor, Record};
use crate::error::{Error, Result};
use crate::partition::{Partition, PartitionRouter, StreamSlice};
use crate::state::{PersistedSyncState, PARENT_STATE_KEY, USE_GLOBAL_CURSOR_KEY};
use crate::types::{JsonObject, JsonValue, RequestOptionType};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Partitions still to visit and slices still to hand out
#[derive(Debug, Default)]
struct SliceGeneration {
    pending: VecDeque<Partition>,
    current: VecDeque<StreamSlice>,
}

/// Orchestrates a per-partition cursor and a global cursor for one stream
#[derive(Debug)]
pub struct PerPartitionWithGlobalCursor {
    stream: String,
    router: Arc<dyn PartitionRouter>,
    per_partition: PerPartitionCursor,
    global: GlobalSubstreamCursor,
    mode: CursorMode,
    parent_state: JsonObject,
    generation: Option<SliceGeneration>,
}

impl PerPartitionWithGlobalCursor {
    /// Create an orchestrator in per-partition mode
    pub fn new(
        stream: impl Into<String>,
        factory: Arc<dyn CursorFactory>,
        router: Arc<dyn PartitionRouter>,
    ) -> Self {
        let global = GlobalSubstreamCursor::new(factory.create(), Arc::clone(&router));
        let per_partition = PerPartitionCursor::new(factory, Arc::clone(&router));
        Self {
            stream: stream.into(),
            router,
            per_partition,
            global,
            mode: CursorMode::PerPartition,
            parent_state: JsonObject::new(),
            generation: None,
        }
    }

    /// Override the partition ceiling
    pub fn with_partition_limit(mut self, limit: usize) -> Result<Self> {
        self.per_partition = self.per_partition.with_partition_limit(limit)?;
        Ok(self)
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Active mode
    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    /// Whether the global cursor is authoritative
    pub fn use_global_cursor(&self) -> bool {
        self.mode.is_global()
    }

    /// Last known parent stream state
    pub fn parent_state(&self) -> &JsonObject {
        &self.parent_state
    }

    /// The per-partition cursor
    pub fn per_partition(&self) -> &PerPartitionCursor {
        &self.per_partition
    }

    /// The global cursor
    pub fn global(&self) -> &GlobalSubstreamCursor {
        &self.global
    }

    fn active(&self) -> &dyn PartitionedCursor {
        match self.mode {
            CursorMode::PerPartition => &self.per_partition,
            CursorMode::Global => &self.global,
        }
    }

    fn active_mut(&mut self) -> &mut dyn PartitionedCursor {
        match self.mode {
            CursorMode::PerPartition => &mut self.per_partition,
            CursorMode::Global => &mut self.global,
        }
    }

    fn switch_to_global_if_needed(&mut self) {
        if self.mode == CursorMode::PerPartition && self.per_partition.limit_reached() {
            info!(
                stream = %self.stream,
                partitions = self.per_partition.partition_count(),
                limit = self.per_partition.partition_limit(),
                "Partition limit exceeded, switching to global cursor"
            );
            self.mode = CursorMode::Global;
        }
    }

    // ------------------------------------------------------------------------
    // Slice generation
    // ------------------------------------------------------------------------

    /// Begin a traversal over the router's partitions
    pub fn start_slices_generation(&mut self) -> Result<()> {
        let partitions = self.router.partitions()?;
        if partitions.iter().any(Partition::is_empty) {
            return Err(Error::partition(
                &self.stream,
                "router produced a partition with no keys",
            ));
        }

        debug!(
            stream = %self.stream,
            partitions = partitions.len(),
            mode = ?self.mode,
            "Starting slice generation"
        );
        self.global.start_slices_generation();
        self.generation = Some(SliceGeneration {
            pending: partitions.into(),
            current: VecDeque::new(),
        });
        Ok(())
    }

    /// Next slice of the traversal, `None` once every partition has been visited
    pub fn next_slice(&mut self) -> Result<Option<StreamSlice>> {
        loop {
            let Some(generation) = self.generation.as_mut() else {
                return Ok(None);
            };

            if let Some(slice) = generation.current.pop_front() {
                let last = generation.current.is_empty() && generation.pending.is_empty();
                self.global.register_slice(last);
                return Ok(Some(slice));
            }

            let Some(partition) = generation.pending.pop_front() else {
                self.finish_slices_generation()?;
                return Ok(None);
            };

            let slices = self.active_mut().generate_slices_from_partition(&partition)?;
            if let Some(generation) = self.generation.as_mut() {
                generation.current.extend(slices);
            }
        }
    }

    /// Every slice of a full traversal, without reading any of them
    pub fn stream_slices(&mut self) -> Result<Vec<StreamSlice>> {
        self.start_slices_generation()?;
        let mut slices = Vec::new();
        while let Some(slice) = self.next_slice()? {
            slices.push(slice);
        }
        Ok(slices)
    }

    fn finish_slices_generation(&mut self) -> Result<()> {
        self.generation = None;
        self.global.finish_slices_generation()?;
        self.parent_state = self.router.stream_state();
        debug!(stream = %self.stream, "Finished slice generation");
        Ok(())
    }
}

impl PartitionedCursor for PerPartitionWithGlobalCursor {
    fn generate_slices_from_partition(&mut self, partition: &Partition) -> Result<Vec<StreamSlice>> {
        self.active_mut().generate_slices_from_partition(partition)
    }

    fn observe(&mut self, slice: &StreamSlice, record: &Record) -> Result<()> {
        self.switch_to_global_if_needed();
        if self.mode == CursorMode::PerPartition {
            self.per_partition.observe(slice, record)?;
        }
        self.global.observe(slice, record)
    }

    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()> {
        self.switch_to_global_if_needed();
        if self.mode == CursorMode::PerPartition {
            self.per_partition.close_slice(slice)?;
        }
        self.global.close_slice(slice)
    }

    fn get_stream_state(&self) -> JsonObject {
        let mut state = JsonObject::new();
        state.insert(
            USE_GLOBAL_CURSOR_KEY.to_string(),
            JsonValue::Bool(self.mode.is_global()),
        );
        state.extend(self.global.get_stream_state());
        if self.mode == CursorMode::PerPartition {
            state.extend(self.per_partition.get_stream_state());
        }
        if !self.parent_state.is_empty() {
            state.insert(
                PARENT_STATE_KEY.to_string(),
                JsonValue::Object(self.parent_state.clone()),
            );
        }
        state
    }

    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()> {
        let persisted = PersistedSyncState::from_object(state)?;
        self.mode = if persisted.use_global_cursor {
            CursorMode::Global
        } else {
            CursorMode::PerPartition
        };
        self.parent_state = persisted.parent_state;

        self.global.set_initial_state(state)?;
        if self.mode == CursorMode::PerPartition {
            self.per_partition.set_initial_state(state)?;
        }

        debug!(stream = %self.stream, mode = ?self.mode, "Seeded cursor from state");
        Ok(())
    }

    fn select_state(&self, slice: Option<&StreamSlice>) -> Option<JsonObject> {
        self.active().select_state(slice)
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        self.active().should_be_synced(record)
    }

    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> Result<bool> {
        self.active().is_greater_than_or_equal(first, second)
    }

    fn request_options(&self, option_type: RequestOptionType, slice: Option<&StreamSlice>) -> JsonObject {
        self.active().request_options(option_type, slice)
    }
}
