//! Tests for partition module

use super::*;
use crate::types::{JsonObject, RequestOption, RequestOptionType};
use serde_json::json;
use std::collections::HashSet;

fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().unwrap().clone()
}

// ============================================================================
// Partition Tests
// ============================================================================

#[test]
fn test_partition_equality_ignores_key_order() {
    let a = Partition::new(object(json!({"id": "1", "parent_slice": {"a": 1, "b": 2}})));
    let b = Partition::new(object(json!({"parent_slice": {"b": 2, "a": 1}, "id": "1"})));

    assert_eq!(a, b);
    assert_eq!(a.key(), b.key());

    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
}

#[test]
fn test_partition_distinct_values() {
    let a = Partition::empty().with_value("id", "1");
    let b = Partition::empty().with_value("id", 1);
    assert_ne!(a, b);
}

#[test]
fn test_partition_from_value() {
    let p = Partition::from_value(&json!({"id": "13506132"})).unwrap();
    assert_eq!(p.get_string("id"), Some("13506132"));
    assert!(!p.is_empty());

    assert!(Partition::from_value(&json!("13506132")).is_err());
}

#[test]
fn test_partition_serde() {
    let p: Partition = serde_json::from_value(json!({"id": "1"})).unwrap();
    assert_eq!(serde_json::to_value(&p).unwrap(), json!({"id": "1"}));
}

// ============================================================================
// StreamSlice Tests
// ============================================================================

#[test]
fn test_stream_slice_lookup_and_flatten() {
    let partition = Partition::empty().with_value("id", "1");
    let slice = StreamSlice::new(
        partition,
        object(json!({"start_time": "2024-01-01", "end_time": "2024-01-31"})),
    );

    assert_eq!(slice.get("id"), Some(&json!("1")));
    assert_eq!(slice.get("start_time"), Some(&json!("2024-01-01")));
    assert_eq!(
        slice.to_value(),
        json!({"id": "1", "start_time": "2024-01-01", "end_time": "2024-01-31"})
    );
}

// ============================================================================
// ListRouter Tests
// ============================================================================

#[test]
fn test_list_router() {
    let router = ListRouter::new(vec!["us".to_string(), "eu".to_string()], "region");
    let partitions = router.partitions().unwrap();

    assert_eq!(partitions.len(), 2);
    assert_eq!(partitions[0].get_string("region"), Some("us"));
    assert_eq!(partitions[1].get_string("region"), Some("eu"));
    assert!(router.stream_state().is_empty());
    assert!(router.parent_stream_configs().is_empty());
}

#[test]
fn test_list_router_request_options() {
    let router = ListRouter::new(vec!["us".to_string()], "region")
        .with_request_option(RequestOption::new(RequestOptionType::Header, "X-Region"));
    let partition = router.partitions().unwrap().remove(0);

    let headers = router.request_options(RequestOptionType::Header, &partition);
    assert_eq!(headers.get("X-Region"), Some(&json!("us")));

    let params = router.request_options(RequestOptionType::RequestParameter, &partition);
    assert!(params.is_empty());
}

// ============================================================================
// ParentRouter Tests
// ============================================================================

#[test]
fn test_parent_router_partitions() {
    let router = ParentRouter::new(vec![ParentStreamConfig::new("projects", "id", "project_id")])
        .with_records(
            "projects",
            vec![json!({"id": 1}), json!({"id": "2"}), json!({"id": 1}), json!({"name": "x"})],
        );

    let partitions = router.partitions().unwrap();
    assert_eq!(partitions.len(), 2);
    assert_eq!(
        partitions[0].to_value(),
        json!({"project_id": "1", "parent_slice": {}})
    );
    assert_eq!(partitions[1].get_string("project_id"), Some("2"));
}

#[test]
fn test_parent_router_nested_key() {
    let router = ParentRouter::new(vec![ParentStreamConfig::new("boards", "data.id", "board_id")])
        .with_records("boards", vec![json!({"data": {"id": "b1"}})]);

    let partitions = router.partitions().unwrap();
    assert_eq!(partitions[0].get_string("board_id"), Some("b1"));
}

#[test]
fn test_parent_router_missing_partition_field() {
    let router = ParentRouter::new(vec![ParentStreamConfig::new("projects", "id", "")])
        .with_records("projects", vec![json!({"id": 1})]);

    let err = router.partitions().unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_parent_router_stream_state_only_for_incremental_dependency() {
    let router = ParentRouter::new(vec![
        ParentStreamConfig::new("projects", "id", "project_id").with_incremental_dependency(true),
        ParentStreamConfig::new("users", "id", "user_id"),
    ])
    .with_parent_state("projects", json!({"updated_at": "2024-01-01"}))
    .with_parent_state("users", json!({"updated_at": "2024-02-01"}));

    let state = router.stream_state();
    assert_eq!(state.len(), 1);
    assert_eq!(state.get("projects"), Some(&json!({"updated_at": "2024-01-01"})));
}

#[test]
fn test_parent_router_request_options() {
    let router = ParentRouter::new(vec![ParentStreamConfig::new("projects", "id", "project_id")
        .with_request_option(RequestOption::param("project"))])
    .with_records("projects", vec![json!({"id": "p1"})]);
    let partition = router.partitions().unwrap().remove(0);

    let params = router.request_options(RequestOptionType::RequestParameter, &partition);
    assert_eq!(params.get("project"), Some(&json!("p1")));
    assert_eq!(router.parent_stream_configs().len(), 1);
}
