//! Common types used throughout the engine
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// Request Options
// ============================================================================

/// Where a cursor or partition value is injected into an outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOptionType {
    /// Query parameter
    #[default]
    RequestParameter,
    /// HTTP header
    Header,
    /// Form-encoded body field
    BodyData,
    /// JSON body field
    BodyJson,
}

/// A single request injection: the slice value goes into `field_name` at `inject_into`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOption {
    /// Injection target
    #[serde(default)]
    pub inject_into: RequestOptionType,
    /// Name of the parameter, header or body field
    pub field_name: String,
}

impl RequestOption {
    /// Create a new request option
    pub fn new(inject_into: RequestOptionType, field_name: impl Into<String>) -> Self {
        Self {
            inject_into,
            field_name: field_name.into(),
        }
    }

    /// Create a query parameter option
    pub fn param(field_name: impl Into<String>) -> Self {
        Self::new(RequestOptionType::RequestParameter, field_name)
    }
}

/// Render a JSON value the way it appears in query strings, headers and form bodies
pub fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Convert injected JSON options into a flat string map
pub fn to_string_map(options: &JsonObject) -> StringMap {
    options
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for engine messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
