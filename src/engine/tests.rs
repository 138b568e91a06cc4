//! Tests for engine module

use super::*;
use crate::cursor::{parse_datetime, CursorMode, DatetimeBasedCursor, DatetimeCursorConfig};
use crate::migration::{LegacyToPerPartitionStateMigration, ParentSliceStateMigration};
use crate::partition::{ListRouter, ParentRouter, ParentStreamConfig, Partition, StreamSlice};
use crate::types::{LogLevel, RequestOption};
use async_trait::async_trait;
use chrono::Duration;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn daily_config() -> DatetimeCursorConfig {
    DatetimeCursorConfig::new("updated_at", parse_datetime("2024-01-01T00:00:00Z").unwrap())
        .with_end(parse_datetime("2024-01-03T23:59:59Z").unwrap())
        .with_step(Duration::days(1), Duration::seconds(1))
        .with_start_time_option(RequestOption::param("since"))
}

fn cursor_with(config: DatetimeCursorConfig, ids: &[&str]) -> PerPartitionWithGlobalCursor {
    let router = ListRouter::new(ids.iter().map(|id| (*id).to_string()).collect(), "id");
    PerPartitionWithGlobalCursor::new(
        "comments",
        DatetimeBasedCursor::factory(config),
        Arc::new(router),
    )
}

fn partition(id: &str) -> Partition {
    Partition::empty().with_value("id", id)
}

fn source() -> InMemorySource {
    InMemorySource::new()
        .with_window(daily_config())
        .with_records(
            partition("a"),
            vec![
                json!({"id": "a1", "updated_at": "2024-01-01T10:00:00Z"}),
                json!({"id": "a2", "updated_at": "2024-01-02T10:00:00Z"}),
                json!({"id": "a3", "updated_at": "2024-01-03T10:00:00Z"}),
            ],
        )
        .with_records(
            partition("b"),
            vec![
                json!({"id": "b1", "updated_at": "2024-01-01T12:00:00Z"}),
                json!({"id": "b2", "updated_at": "2024-01-03T12:00:00Z"}),
            ],
        )
}

fn record_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(Message::as_record)
        .filter_map(|r| r["id"].as_str().map(ToString::to_string))
        .collect()
}

#[derive(Debug)]
struct FailingSource;

#[async_trait]
impl RecordSource for FailingSource {
    async fn read_slice(
        &self,
        slice: &StreamSlice,
        _request: &SliceRequest,
    ) -> Result<Vec<serde_json::Value>> {
        if slice.partition.get_string("id") == Some("b") {
            return Err(Error::Other("upstream unavailable".to_string()));
        }
        Ok(vec![json!({"id": "a1", "updated_at": "2024-01-01T10:00:00Z"})])
    }
}

/// Fails the first daily window of partition "a", serves everything else
#[derive(Debug)]
struct FirstWindowFails {
    inner: InMemorySource,
}

#[async_trait]
impl RecordSource for FirstWindowFails {
    async fn read_slice(
        &self,
        slice: &StreamSlice,
        request: &SliceRequest,
    ) -> Result<Vec<serde_json::Value>> {
        if slice.partition.get_string("id") == Some("a")
            && slice.cursor_slice.get("start_time") == Some(&json!("2024-01-01T00:00:00Z"))
        {
            return Err(Error::Other("timeout".to_string()));
        }
        self.inner.read_slice(slice, request).await
    }
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_message_record() {
    let msg = Message::record("comments", json!({"id": 1}));
    assert!(msg.is_record());
    assert!(!msg.is_state());
    assert!(!msg.is_log());
    assert_eq!(msg.as_record(), Some(&json!({"id": 1})));
}

#[test]
fn test_message_state() {
    let msg = Message::state("comments", json!({"use_global_cursor": false}));
    assert!(msg.is_state());
    assert!(!msg.is_record());
    assert!(msg.as_record().is_none());
}

#[test]
fn test_message_log() {
    assert!(Message::info("test message").is_log());
    assert!(Message::debug("debug").is_log());
    assert!(Message::warn("warning").is_log());
    assert!(Message::error("error").is_log());
}

#[test]
fn test_message_serialization() {
    let msg = Message::state("comments", json!({"state": {}}));
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({"type": "STATE", "stream": "comments", "data": {"state": {}}})
    );

    let log = Message::log(LogLevel::Warn, "careful");
    assert_eq!(
        serde_json::to_value(&log).unwrap(),
        json!({"type": "LOG", "level": "WARN", "message": "careful"})
    );
}

// ============================================================================
// SyncConfig / SyncStats Tests
// ============================================================================

#[test]
fn test_sync_config_default() {
    let config = SyncConfig::default();
    assert!(!config.emit_state_per_slice);
    assert_eq!(config.max_slices, 0);
    assert!(config.fail_fast);
}

#[test]
fn test_sync_config_builder() {
    let config = SyncConfig::new()
        .with_state_per_slice(true)
        .with_max_slices(3)
        .with_fail_fast(false);

    assert!(config.emit_state_per_slice);
    assert_eq!(config.max_slices, 3);
    assert!(!config.fail_fast);
}

#[test]
fn test_sync_stats_mutations() {
    let mut stats = SyncStats::new();
    stats.add_records(5);
    stats.add_records(3);
    stats.add_skipped();
    stats.add_slice();
    stats.add_error();
    stats.set_duration(1500);

    assert_eq!(stats.records_synced, 8);
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.slices_read, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.duration_ms, 1500);
}

// ============================================================================
// InMemorySource Tests
// ============================================================================

#[tokio::test]
async fn test_in_memory_source_filters_partition_and_window() {
    let source = source();
    let slice = StreamSlice::new(
        partition("a").with_value("parent_slice", json!({})),
        json!({"start_time": "2024-01-02T00:00:00Z", "end_time": "2024-01-02T23:59:59Z"})
            .as_object()
            .unwrap()
            .clone(),
    );

    let records = source
        .read_slice(&slice, &SliceRequest::default())
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"id": "a2", "updated_at": "2024-01-02T10:00:00Z"})]);
    assert_eq!(source.requests().await.len(), 1);
}

#[test]
fn test_in_memory_source_from_value() {
    let source = InMemorySource::from_value(&json!([
        {"partition": {"id": "a"}, "records": [{"id": 1}]},
        {"records": [{"id": 2}]}
    ]))
    .unwrap();
    assert!(format!("{source:?}").contains("InMemorySource"));

    assert!(InMemorySource::from_value(&json!({"records": []})).is_err());
    assert!(InMemorySource::from_value(&json!([{"partition": {"id": "a"}}])).is_err());
}

// ============================================================================
// SyncEngine Tests
// ============================================================================

#[tokio::test]
async fn test_sync_stream_reads_every_slice() {
    let mut engine = SyncEngine::new(StateManager::in_memory());
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);

    let messages = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();

    assert_eq!(record_ids(&messages), vec!["a1", "a2", "a3", "b1", "b2"]);
    assert_eq!(engine.stats().slices_read, 6);
    assert_eq!(engine.stats().partitions_synced, 2);
    assert_eq!(engine.stats().records_synced, 5);

    let stored = engine.state().get_stream_state("comments").await.unwrap();
    assert_eq!(stored["use_global_cursor"], json!(false));
    assert_eq!(stored["state"], json!({"updated_at": "2024-01-03T12:00:00Z"}));
    assert_eq!(
        stored["states"],
        json!([
            {"partition": {"id": "a"}, "cursor": {"updated_at": "2024-01-03T10:00:00Z"}},
            {"partition": {"id": "b"}, "cursor": {"updated_at": "2024-01-03T12:00:00Z"}}
        ])
    );

    let last_state = messages.iter().rev().find_map(Message::as_state).unwrap();
    assert_eq!(last_state, &JsonValue::Object(stored));
}

#[tokio::test]
async fn test_sync_stream_skips_records_outside_window() {
    let config = DatetimeCursorConfig::new("updated_at", parse_datetime("2024-01-01").unwrap())
        .with_end(parse_datetime("2024-01-03T23:59:59Z").unwrap());
    let source = InMemorySource::new().with_records(
        partition("a"),
        vec![
            json!({"id": "old", "updated_at": "2023-12-31T00:00:00Z"}),
            json!({"id": "new", "updated_at": "2024-01-02T00:00:00Z"}),
        ],
    );

    let mut engine = SyncEngine::new(StateManager::in_memory());
    let mut cursor = cursor_with(config, &["a"]);
    let messages = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &source)
        .await
        .unwrap();

    assert_eq!(record_ids(&messages), vec!["new"]);
    assert_eq!(engine.stats().records_skipped, 1);
}

#[tokio::test]
async fn test_sync_stream_state_per_slice() {
    let mut engine = SyncEngine::new(StateManager::in_memory())
        .with_config(SyncConfig::new().with_state_per_slice(true));
    let mut cursor = cursor_with(daily_config(), &["a"]);

    let messages = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();

    let states: Vec<_> = messages.iter().filter_map(Message::as_state).collect();
    assert_eq!(states.len(), 4);
    assert_eq!(
        states[0]["states"][0]["cursor"],
        json!({"updated_at": "2024-01-01T10:00:00Z"})
    );
    // The global cursor only moves once the traversal is complete
    assert_eq!(states[1]["state"], json!({}));
    assert_eq!(states[2]["state"], json!({"updated_at": "2024-01-03T10:00:00Z"}));
}

#[tokio::test]
async fn test_sync_stream_interrupted_then_resumed() {
    let state = StateManager::in_memory();

    let mut first = SyncEngine::new(state.clone())
        .with_config(SyncConfig::new().with_max_slices(2));
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);
    let interrupted = first
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();
    assert_eq!(record_ids(&interrupted), vec!["a1", "a2"]);

    let mut second = SyncEngine::new(state.clone());
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);
    let resumed = second
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();

    let mut seen = record_ids(&interrupted);
    seen.extend(record_ids(&resumed));
    seen.sort();
    seen.dedup();
    assert_eq!(seen, vec!["a1", "a2", "a3", "b1", "b2"]);
    assert!(!record_ids(&resumed).contains(&"a1".to_string()));
}

#[tokio::test]
async fn test_sync_stream_applies_migrations() {
    let state = StateManager::from_json(
        r#"{"comments": {"a": {"updated_at": "2024-01-02T00:00:00Z"}}}"#,
    )
    .unwrap();
    let posts = ParentStreamConfig::new("posts", "id", "id");
    let router = ParentRouter::new(vec![posts.clone()]).with_records("posts", vec![json!({"id": "a"})]);
    let migrations = MigrationChain::new()
        .with_migration(LegacyToPerPartitionStateMigration::new("updated_at", vec![posts]))
        .with_migration(ParentSliceStateMigration::new());

    let mut engine = SyncEngine::new(state);
    let mut cursor = PerPartitionWithGlobalCursor::new(
        "comments",
        DatetimeBasedCursor::factory(daily_config()),
        Arc::new(router),
    );
    let messages = engine
        .sync_stream(&mut cursor, &migrations, &source())
        .await
        .unwrap();

    // The migrated entry matches the router's partition and resumes from it
    assert_eq!(record_ids(&messages), vec!["a2", "a3"]);
    let stored = engine.state().get_stream_state("comments").await.unwrap();
    assert_eq!(
        stored["states"],
        json!([{
            "partition": {"id": "a", "parent_slice": {}},
            "cursor": {"updated_at": "2024-01-03T10:00:00Z"}
        }])
    );
}

#[tokio::test]
async fn test_sync_stream_resumes_from_legacy_flat_state() {
    let state = StateManager::from_json(
        r#"{"comments": {"a": {"updated_at": "2024-01-02T00:00:00Z"}}}"#,
    )
    .unwrap();
    let migrations = MigrationChain::new().with_migration(LegacyToPerPartitionStateMigration::new(
        "updated_at",
        vec![ParentStreamConfig::new("posts", "id", "id")],
    ));

    let mut engine = SyncEngine::new(state);
    let mut cursor = cursor_with(daily_config(), &["a"]);
    let source = source();
    let messages = engine
        .sync_stream(&mut cursor, &migrations, &source)
        .await
        .unwrap();

    assert_eq!(record_ids(&messages), vec!["a2", "a3"]);
    let requests = source.requests().await;
    assert_eq!(
        requests[0].params.get("since").map(String::as_str),
        Some("2024-01-02T00:00:00Z")
    );
}

#[tokio::test]
async fn test_sync_stream_fail_fast() {
    let mut engine = SyncEngine::new(StateManager::in_memory());
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);

    let result = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &FailingSource)
        .await;
    assert!(result.is_err());
    assert_eq!(engine.stats().errors, 1);
}

#[tokio::test]
async fn test_sync_stream_failed_slice_holds_global_cursor() {
    let mut engine = SyncEngine::new(StateManager::in_memory())
        .with_config(SyncConfig::new().with_fail_fast(false));
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);

    let messages = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &FailingSource)
        .await
        .unwrap();

    // The first failure skips the remaining windows of "b"
    assert_eq!(engine.stats().errors, 1);
    assert_eq!(engine.stats().slices_read, 3);
    assert!(messages.iter().any(|m| matches!(m, Message::Log { level: LogLevel::Error, .. })));

    let stored = engine.state().get_stream_state("comments").await.unwrap();
    assert_eq!(stored["state"], json!({}));
    assert_eq!(stored["states"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sync_stream_failed_window_is_read_on_resume() {
    let state = StateManager::in_memory();
    let flaky = FirstWindowFails { inner: source() };

    let mut first = SyncEngine::new(state.clone())
        .with_config(SyncConfig::new().with_fail_fast(false));
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);
    let messages = first
        .sync_stream(&mut cursor, &MigrationChain::new(), &flaky)
        .await
        .unwrap();

    assert_eq!(record_ids(&messages), vec!["b1", "b2"]);
    assert_eq!(first.stats().errors, 1);

    let stored = state.get_stream_state("comments").await.unwrap();
    assert_eq!(
        stored["states"],
        json!([{"partition": {"id": "b"}, "cursor": {"updated_at": "2024-01-03T12:00:00Z"}}])
    );

    let mut second = SyncEngine::new(state.clone());
    let mut cursor = cursor_with(daily_config(), &["a", "b"]);
    let resumed = second
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();

    assert_eq!(record_ids(&resumed), vec!["a1", "a2", "a3", "b2"]);
}

#[tokio::test]
async fn test_sync_stream_switches_to_global() {
    let mut engine = SyncEngine::new(StateManager::in_memory());
    let mut cursor = cursor_with(daily_config(), &["a", "b"])
        .with_partition_limit(1)
        .unwrap();

    engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap();

    assert_eq!(cursor.mode(), CursorMode::Global);
    let stored = engine.state().get_stream_state("comments").await.unwrap();
    assert_eq!(stored["use_global_cursor"], json!(true));
    assert!(!stored.contains_key("states"));
    assert_eq!(stored["state"], json!({"updated_at": "2024-01-03T12:00:00Z"}));
}

#[tokio::test]
async fn test_sync_stream_rejects_malformed_stored_state() {
    let state = StateManager::from_json(r#"{"comments": {"states": "broken"}}"#).unwrap();
    let mut engine = SyncEngine::new(state);
    let mut cursor = cursor_with(daily_config(), &["a"]);

    let err = engine
        .sync_stream(&mut cursor, &MigrationChain::new(), &source())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::State { .. }));
}
