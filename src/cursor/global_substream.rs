//! Global substream cursor
//!
//! One stream cursor shared by every partition. The cursor only advances once
//! every slice of a full traversal has been closed, so an interrupted run never
//! persists a point past records it has not read.

use super::types::{merge_options, PartitionedCursor, Record, StreamCursor};
use crate::error::Result;
use crate::partition::{Partition, PartitionRouter, StreamSlice};
use crate::state::{strip_reserved_keys, LOOKBACK_WINDOW_KEY, STATE_KEY};
use crate::types::{JsonObject, JsonValue, RequestOptionType};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Measures one full traversal
#[derive(Debug, Default)]
struct Timer {
    started: Option<Instant>,
}

impl Timer {
    fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Elapsed whole seconds, rounded up
    fn finish(&mut self) -> Option<u64> {
        self.started.take().map(|started| {
            let elapsed = started.elapsed();
            elapsed.as_secs() + u64::from(elapsed.subsec_nanos() > 0)
        })
    }
}

/// Shares a single cursor across all partitions
#[derive(Debug)]
pub struct GlobalSubstreamCursor {
    stream_cursor: Box<dyn StreamCursor>,
    router: Arc<dyn PartitionRouter>,
    timer: Timer,
    open_slices: usize,
    all_slices_yielded: bool,
    /// Most recent close that could not be committed yet
    pending_close: Option<JsonObject>,
    lookback_window: Option<u64>,
}

impl GlobalSubstreamCursor {
    /// Wrap a stream cursor
    pub fn new(stream_cursor: Box<dyn StreamCursor>, router: Arc<dyn PartitionRouter>) -> Self {
        Self {
            stream_cursor,
            router,
            timer: Timer::default(),
            open_slices: 0,
            all_slices_yielded: false,
            pending_close: None,
            lookback_window: None,
        }
    }

    /// Begin a traversal over all partitions
    pub fn start_slices_generation(&mut self) {
        self.timer.start();
        self.open_slices = 0;
        self.all_slices_yielded = false;
        self.pending_close = None;
    }

    /// Account for a slice handed to the reader
    pub fn register_slice(&mut self, last: bool) {
        self.open_slices += 1;
        if last {
            self.all_slices_yielded = true;
        }
    }

    /// Mark the traversal complete, committing a buffered close if nothing is open
    pub fn finish_slices_generation(&mut self) -> Result<()> {
        self.all_slices_yielded = true;
        if self.open_slices == 0 {
            if let Some(cursor_slice) = self.pending_close.take() {
                self.commit(&cursor_slice)?;
            }
        }
        Ok(())
    }

    /// Duration of the last completed traversal, in seconds
    pub fn lookback_window(&self) -> Option<u64> {
        self.lookback_window
    }

    /// Slices handed out but not yet closed
    pub fn open_slices(&self) -> usize {
        self.open_slices
    }

    /// Whether every slice of the traversal has been handed out
    pub fn all_slices_yielded(&self) -> bool {
        self.all_slices_yielded
    }

    fn commit(&mut self, cursor_slice: &JsonObject) -> Result<()> {
        if let Some(elapsed) = self.timer.finish() {
            self.lookback_window = Some(elapsed);
        }
        self.pending_close = None;
        self.stream_cursor.close_slice(cursor_slice)?;
        debug!(
            lookback_window = ?self.lookback_window,
            "Committed global cursor"
        );
        Ok(())
    }
}

impl PartitionedCursor for GlobalSubstreamCursor {
    fn generate_slices_from_partition(&mut self, partition: &Partition) -> Result<Vec<StreamSlice>> {
        Ok(self
            .stream_cursor
            .stream_slices()?
            .into_iter()
            .map(|cs| StreamSlice::new(partition.clone(), cs))
            .collect())
    }

    fn observe(&mut self, slice: &StreamSlice, record: &Record) -> Result<()> {
        self.stream_cursor.observe(&slice.cursor_slice, &record.data)
    }

    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()> {
        self.open_slices = self.open_slices.saturating_sub(1);
        if self.all_slices_yielded && self.open_slices == 0 {
            self.commit(&slice.cursor_slice)
        } else {
            self.pending_close = Some(slice.cursor_slice.clone());
            Ok(())
        }
    }

    fn get_stream_state(&self) -> JsonObject {
        let mut state = JsonObject::new();
        state.insert(
            STATE_KEY.to_string(),
            JsonValue::Object(self.stream_cursor.get_stream_state()),
        );
        if let Some(lookback) = self.lookback_window {
            state.insert(LOOKBACK_WINDOW_KEY.to_string(), JsonValue::from(lookback));
        }
        state
    }

    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }

        self.lookback_window = state.get(LOOKBACK_WINDOW_KEY).and_then(JsonValue::as_u64);

        let cursor_state = match state.get(STATE_KEY) {
            Some(JsonValue::Object(global)) => global.clone(),
            Some(_) => JsonObject::new(),
            None => strip_reserved_keys(state),
        };
        self.stream_cursor.set_initial_state(&cursor_state)?;

        if let Some(lookback) = self.lookback_window {
            self.stream_cursor.set_runtime_lookback_window(lookback);
        }
        Ok(())
    }

    fn select_state(&self, _slice: Option<&StreamSlice>) -> Option<JsonObject> {
        Some(self.stream_cursor.get_stream_state())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        self.stream_cursor.should_be_synced(&record.data)
    }

    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> Result<bool> {
        Ok(self
            .stream_cursor
            .is_greater_than_or_equal(&first.data, &second.data))
    }

    fn request_options(&self, option_type: RequestOptionType, slice: Option<&StreamSlice>) -> JsonObject {
        let Some(slice) = slice else {
            return JsonObject::new();
        };
        merge_options(
            self.router.request_options(option_type, &slice.partition),
            self.stream_cursor
                .request_options(option_type, &slice.cursor_slice),
        )
    }
}
