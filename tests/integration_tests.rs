//! Integration tests over recorded records
//!
//! Tests the full end-to-end flow: YAML definition → state migrations → slices → state file

use pretty_assertions::assert_eq;
use serde_json::json;
use solidafy_incremental::cursor::CursorMode;
use solidafy_incremental::engine::{InMemorySource, Message, SyncConfig, SyncEngine};
use solidafy_incremental::loader::{load_definition_from_str, ParentRecords, StreamDefinition};
use solidafy_incremental::partition::Partition;
use solidafy_incremental::state::StateManager;
use std::collections::BTreeSet;

const DEFINITION: &str = r#"
streams:
  - name: comments
    cursor:
      cursor_field: updated_at
      start_datetime: "2024-01-01T00:00:00Z"
      end_datetime: "2024-01-03T23:59:59Z"
      step: 1d
      cursor_granularity: 1s
      start_time_option:
        inject_into: request_parameter
        field_name: since
    partition_router:
      type: parent
      parent_stream_configs:
        - stream: posts
          parent_key: id
          partition_field: post_id
    state_migrations:
      - type: legacy_to_per_partition
      - type: parent_slice

  - name: tickets
    cursor:
      cursor_field: updated_at
      start_datetime: "2024-01-01T00:00:00Z"
      end_datetime: "2024-01-04T23:59:59Z"
      step: 1d
      cursor_granularity: 1s
    partition_router:
      type: list
      values: [eu, us, apac]
      partition_field: region
"#;

// ============================================================================
// Helpers
// ============================================================================

fn stream(name: &str) -> StreamDefinition {
    load_definition_from_str(DEFINITION)
        .unwrap()
        .stream(name)
        .unwrap()
        .clone()
}

fn posts() -> ParentRecords {
    let mut parents = ParentRecords::new();
    parents.insert("posts".to_string(), vec![json!({"id": "1"}), json!({"id": "2"})]);
    parents
}

fn comments_source(def: &StreamDefinition) -> InMemorySource {
    InMemorySource::from_value(&json!([
        {"partition": {"post_id": "1"}, "records": [
            {"id": "c1", "updated_at": "2024-01-01T05:00:00Z"},
            {"id": "c2", "updated_at": "2024-01-02T05:00:00Z"},
            {"id": "c3", "updated_at": "2024-01-03T05:00:00Z"}
        ]},
        {"partition": {"post_id": "2"}, "records": [
            {"id": "d1", "updated_at": "2024-01-01T06:00:00Z"}
        ]}
    ]))
    .unwrap()
    .with_window(def.cursor.to_config().unwrap())
}

fn tickets_source(def: &StreamDefinition) -> InMemorySource {
    let mut source = InMemorySource::new();
    for (region, hours) in [("eu", [1, 30, 80]), ("us", [10, 50, 90]), ("apac", [20, 60, 70])] {
        let records = hours
            .iter()
            .map(|h| {
                let at = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    + chrono::Duration::hours(*h);
                json!({
                    "id": format!("{region}-{h}"),
                    "updated_at": at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
                })
            })
            .collect();
        source = source.with_records(Partition::empty().with_value("region", region), records);
    }
    source.with_window(def.cursor.to_config().unwrap())
}

fn record_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(Message::as_record)
        .filter_map(|r| r["id"].as_str().map(ToString::to_string))
        .collect()
}

fn checkpoints(messages: &[Message]) -> Vec<&serde_json::Value> {
    messages.iter().filter_map(Message::as_state).collect()
}

/// Once a checkpoint reports the global cursor, no later one reports partition states
fn assert_switch_is_monotonic(states: &[&serde_json::Value]) {
    let Some(switched_at) = states.iter().position(|s| s["use_global_cursor"] == json!(true))
    else {
        return;
    };
    for state in &states[switched_at..] {
        assert_eq!(state["use_global_cursor"], json!(true));
        assert!(state.get("states").is_none(), "partition states after switch: {state}");
    }
}

fn limited_tickets(limit: usize) -> StreamDefinition {
    let yaml = DEFINITION.replace(
        "      partition_field: region\n",
        &format!("      partition_field: region\n    partition_limit: {limit}\n"),
    );
    load_definition_from_str(&yaml)
        .unwrap()
        .stream("tickets")
        .unwrap()
        .clone()
}

async fn run(def: &StreamDefinition, state: &StateManager, config: SyncConfig) -> Vec<Message> {
    let router = def.build_router(&posts());
    let migrations = def.build_migrations(router.as_ref());
    let mut cursor = def.build_cursor(router).unwrap();
    let source = if def.name == "tickets" {
        tickets_source(def)
    } else {
        comments_source(def)
    };

    SyncEngine::new(state.clone())
        .with_config(config)
        .sync_stream(&mut cursor, &migrations, &source)
        .await
        .unwrap()
}

// ============================================================================
// Migration → Read → State File
// ============================================================================

#[tokio::test]
async fn test_legacy_state_file_is_migrated_and_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"comments": {"1": {"updated_at": "2024-01-02T00:00:00Z"}}}"#,
    )
    .unwrap();

    let def = stream("comments");
    let state = StateManager::from_file(&path).unwrap();
    let messages = run(&def, &state, SyncConfig::default()).await;

    // Post 1 resumes from its migrated cursor, post 2 starts from scratch
    assert_eq!(record_ids(&messages), vec!["c2", "c3", "d1"]);

    let saved = StateManager::from_file(&path).unwrap();
    let comments = saved.get_stream_state("comments").await.unwrap();
    assert_eq!(comments["use_global_cursor"], json!(false));
    assert_eq!(comments["state"], json!({"updated_at": "2024-01-03T05:00:00Z"}));
    assert!(comments["lookback_window"].is_u64());
    assert!(!comments.contains_key("parent_state"));
    assert_eq!(
        comments["states"],
        json!([
            {
                "partition": {"post_id": "1", "parent_slice": {}},
                "cursor": {"updated_at": "2024-01-03T05:00:00Z"}
            },
            {
                "partition": {"post_id": "2", "parent_slice": {}},
                "cursor": {"updated_at": "2024-01-01T06:00:00Z"}
            }
        ])
    );

    // A second run only re-reads the records sitting on each partition's cursor
    let again = run(&def, &StateManager::from_file(&path).unwrap(), SyncConfig::default()).await;
    assert_eq!(record_ids(&again), vec!["c3", "d1"]);
}

// ============================================================================
// Checkpoint Safety
// ============================================================================

#[tokio::test]
async fn test_interrupted_runs_never_lose_records() {
    let def = stream("tickets");

    let full = run(&def, &StateManager::in_memory(), SyncConfig::default()).await;
    let expected: BTreeSet<String> = record_ids(&full).into_iter().collect();
    assert_eq!(expected.len(), 9);

    // 3 partitions x 4 daily windows
    for k in 1..12 {
        let state = StateManager::in_memory();
        let first = run(&def, &state, SyncConfig::new().with_max_slices(k)).await;
        let second = run(&def, &state, SyncConfig::default()).await;

        let union: BTreeSet<String> = record_ids(&first)
            .into_iter()
            .chain(record_ids(&second))
            .collect();
        assert_eq!(union, expected, "records lost after interrupting at slice {k}");
    }
}

#[tokio::test]
async fn test_interrupted_runs_across_the_global_switch() {
    let def = limited_tickets(2);

    let full = run(&def, &StateManager::in_memory(), SyncConfig::default()).await;
    let expected: BTreeSet<String> = record_ids(&full).into_iter().collect();
    assert_eq!(expected.len(), 9);

    // "apac" is the third partition: its first slice (the 9th) crosses the limit
    for k in 1..12 {
        let state = StateManager::in_memory();
        let config = SyncConfig::new().with_state_per_slice(true);
        let first = run(&def, &state, config.clone().with_max_slices(k)).await;
        let second = run(&def, &state, config).await;

        let first_states = checkpoints(&first);
        assert_switch_is_monotonic(&first_states);
        assert_eq!(
            first_states.last().unwrap()["use_global_cursor"],
            json!(k >= 9),
            "interrupted at slice {k}"
        );
        assert_switch_is_monotonic(&checkpoints(&second));
        assert_eq!(state.get_stream_state("tickets").await.unwrap()["use_global_cursor"], json!(true));

        let union: BTreeSet<String> = record_ids(&first)
            .into_iter()
            .chain(record_ids(&second))
            .collect();
        assert_eq!(union, expected, "records lost after interrupting at slice {k}");
    }
}

#[tokio::test]
async fn test_global_cursor_waits_for_full_traversal() {
    let def = stream("tickets");
    let state = StateManager::in_memory();

    run(&def, &state, SyncConfig::new().with_max_slices(11)).await;
    let interrupted = state.get_stream_state("tickets").await.unwrap();
    assert_eq!(interrupted["state"], json!({}));

    run(&def, &state, SyncConfig::default()).await;
    let complete = state.get_stream_state("tickets").await.unwrap();
    assert_eq!(complete["state"], json!({"updated_at": "2024-01-04T18:00:00Z"}));
}

// ============================================================================
// Per-Partition → Global Switch
// ============================================================================

#[tokio::test]
async fn test_switch_to_global_is_permanent() {
    let def = limited_tickets(2);
    let state = StateManager::in_memory();

    let first = run(&def, &state, SyncConfig::default()).await;
    assert_eq!(record_ids(&first).len(), 9);

    let stored = state.get_stream_state("tickets").await.unwrap();
    assert_eq!(stored["use_global_cursor"], json!(true));
    assert!(!stored.contains_key("states"));

    // Resumed from the global cursor, every partition starts at the latest record
    let router = def.build_router(&ParentRecords::new());
    let migrations = def.build_migrations(router.as_ref());
    let mut cursor = def.build_cursor(router).unwrap();
    let second = SyncEngine::new(state.clone())
        .sync_stream(&mut cursor, &migrations, &tickets_source(&def))
        .await
        .unwrap();

    assert_eq!(cursor.mode(), CursorMode::Global);
    assert_eq!(record_ids(&second), vec!["us-90"]);
    let stored = state.get_stream_state("tickets").await.unwrap();
    assert_eq!(stored["use_global_cursor"], json!(true));
}
