//! State management module
//!
//! Handles the persisted state document, its conversion between sequential
//! and interval shapes, and its persistence between sync runs.
//!
//! # Overview
//!
//! The state module provides:
//! - `PersistedSyncState` - Typed view of a partitioned stream's state document
//! - `StreamStateConverter` - Sequential ⇄ interval conversion and interval merging
//! - `StateManager` - File-based state persistence

mod converter;
mod manager;
mod types;

pub use converter::{
    DateTimeConverter, EpochValueConverter, Interval, StreamStateConverter, LEGACY_KEY,
    SLICES_KEY, STATE_TYPE_KEY,
};
pub use manager::StateManager;
pub use types::{
    strip_reserved_keys, ConnectorState, PartitionState, PersistedSyncState, LOOKBACK_WINDOW_KEY,
    PARENT_STATE_KEY, RESERVED_STATE_KEYS, STATES_KEY, STATE_KEY, USE_GLOBAL_CURSOR_KEY,
};
