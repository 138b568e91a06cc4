//! Sequential ⇄ interval state conversion
//!
//! A sequential state is a flat legacy cursor (`{"updated_at": "2024-01-01"}`).
//! An interval state records every synced range:
//!
//! ```json
//! {
//!   "state_type": "date-range",
//!   "slices": [{"start": "1970-01-01", "end": "2024-01-01"}],
//!   "legacy": {"updated_at": "2024-01-01"}
//! }
//! ```

use crate::cursor::{format_with, parse_datetime, parse_with_format};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Key naming the converter that produced an interval state
pub const STATE_TYPE_KEY: &str = "state_type";
/// Key holding the interval list
pub const SLICES_KEY: &str = "slices";
/// Key holding the sequential state the intervals were derived from
pub const LEGACY_KEY: &str = "legacy";

/// A closed `[start, end]` range of synced values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval<T> {
    /// First synced value
    pub start: T,
    /// Last synced value
    pub end: T,
}

impl<T> Interval<T> {
    /// Create a new interval
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

/// Converts a stream's state between its sequential and interval shapes
pub trait StreamStateConverter {
    /// Ordered cursor value
    type Value: Ord + Clone + fmt::Debug;

    /// Value written under `state_type`
    fn state_type(&self) -> &'static str;

    /// Smallest representable value, used as the start of a converted legacy state
    fn zero_value(&self) -> Self::Value;

    /// The value one unit after `value`
    fn increment(&self, value: &Self::Value) -> Self::Value;

    /// Parse a value from state
    fn parse_value(&self, raw: &JsonValue) -> Result<Self::Value>;

    /// Serialize a value to state
    fn output_value(&self, value: &Self::Value) -> JsonValue;

    /// Sort intervals and coalesce the ones that overlap or touch
    fn merge_intervals(&self, mut intervals: Vec<Interval<Self::Value>>) -> Vec<Interval<Self::Value>> {
        intervals.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));

        let mut merged: Vec<Interval<Self::Value>> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(current) if interval.start <= self.increment(&current.end) => {
                    if interval.end > current.end {
                        current.end = interval.end;
                    }
                }
                _ => merged.push(interval),
            }
        }
        merged
    }

    /// Whether `state` is already an interval state of this converter's type
    fn is_state_message_compatible(&self, state: &JsonObject) -> bool {
        !state.is_empty()
            && state.get(STATE_TYPE_KEY).and_then(JsonValue::as_str) == Some(self.state_type())
    }

    /// Wrap a sequential state into a single interval from `zero_value`
    fn convert_from_sequential_state(
        &self,
        cursor_field: &str,
        state: &JsonObject,
    ) -> Result<JsonObject> {
        if self.is_state_message_compatible(state) {
            return Ok(state.clone());
        }

        let zero = self.zero_value();
        let end = match state.get(cursor_field) {
            None | Some(JsonValue::Null) => zero.clone(),
            Some(raw) => self.parse_value(raw)?,
        };

        let mut converted = JsonObject::new();
        converted.insert(
            STATE_TYPE_KEY.to_string(),
            JsonValue::String(self.state_type().to_string()),
        );
        converted.insert(
            SLICES_KEY.to_string(),
            JsonValue::Array(vec![self.interval_to_value(&Interval::new(zero, end))]),
        );
        converted.insert(LEGACY_KEY.to_string(), JsonValue::Object(state.clone()));
        Ok(converted)
    }

    /// Collapse an interval state to its legacy shape, using the furthest `end`
    fn convert_to_sequential_state(
        &self,
        cursor_field: &str,
        state: &JsonObject,
    ) -> Result<JsonObject> {
        let intervals = self.parse_intervals(state)?;
        let Some(latest) = intervals.into_iter().map(|i| i.end).max() else {
            return Ok(JsonObject::new());
        };

        let mut legacy = match state.get(LEGACY_KEY) {
            Some(JsonValue::Object(legacy)) => legacy.clone(),
            _ => JsonObject::new(),
        };
        legacy.insert(cursor_field.to_string(), self.output_value(&latest));
        Ok(legacy)
    }

    /// Rewrite the interval list of a state in merged form
    fn merge_slices(&self, state: &JsonObject) -> Result<JsonObject> {
        let merged = self.merge_intervals(self.parse_intervals(state)?);
        let mut state = state.clone();
        state.insert(
            SLICES_KEY.to_string(),
            JsonValue::Array(merged.iter().map(|i| self.interval_to_value(i)).collect()),
        );
        Ok(state)
    }

    /// Parse the `slices` list of an interval state
    fn parse_intervals(&self, state: &JsonObject) -> Result<Vec<Interval<Self::Value>>> {
        let items = match state.get(SLICES_KEY) {
            None | Some(JsonValue::Null) => return Ok(Vec::new()),
            Some(JsonValue::Array(items)) => items,
            Some(other) => {
                return Err(Error::state(format!("`slices` must be an array, got: {other}")))
            }
        };

        items
            .iter()
            .map(|item| {
                let bound = |key: &str| {
                    item.get(key)
                        .ok_or_else(|| Error::state(format!("Interval has no `{key}`: {item}")))
                        .and_then(|raw| self.parse_value(raw))
                };
                Ok(Interval::new(bound("start")?, bound("end")?))
            })
            .collect()
    }

    /// Serialize an interval to `{start, end}`
    fn interval_to_value(&self, interval: &Interval<Self::Value>) -> JsonValue {
        let mut value = JsonObject::new();
        value.insert("start".to_string(), self.output_value(&interval.start));
        value.insert("end".to_string(), self.output_value(&interval.end));
        JsonValue::Object(value)
    }
}

// ============================================================================
// Epoch Value Converter
// ============================================================================

/// Integer cursors (epoch seconds, sequence numbers)
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochValueConverter;

impl StreamStateConverter for EpochValueConverter {
    type Value = i64;

    fn state_type(&self) -> &'static str {
        "integer"
    }

    fn zero_value(&self) -> i64 {
        0
    }

    fn increment(&self, value: &i64) -> i64 {
        value.saturating_add(1)
    }

    fn parse_value(&self, raw: &JsonValue) -> Result<i64> {
        match raw {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::state(format!("Expected an integer cursor value, got: {raw}")))
    }

    fn output_value(&self, value: &i64) -> JsonValue {
        JsonValue::from(*value)
    }
}

// ============================================================================
// DateTime Converter
// ============================================================================

/// Datetime cursors
#[derive(Debug, Clone)]
pub struct DateTimeConverter {
    format: String,
    granularity: Duration,
}

impl Default for DateTimeConverter {
    fn default() -> Self {
        Self::new("%Y-%m-%dT%H:%M:%SZ")
    }
}

impl DateTimeConverter {
    /// Converter with a one-day adjacency unit
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            granularity: Duration::days(1),
        }
    }

    /// Set the adjacency unit
    #[must_use]
    pub fn with_granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    /// Output format
    pub fn format(&self) -> &str {
        &self.format
    }
}

impl StreamStateConverter for DateTimeConverter {
    type Value = DateTime<Utc>;

    fn state_type(&self) -> &'static str {
        "date-range"
    }

    fn zero_value(&self) -> DateTime<Utc> {
        // Unix epoch
        DateTime::<Utc>::default()
    }

    fn increment(&self, value: &DateTime<Utc>) -> DateTime<Utc> {
        value.checked_add_signed(self.granularity).unwrap_or(*value)
    }

    fn parse_value(&self, raw: &JsonValue) -> Result<DateTime<Utc>> {
        let parsed = match raw {
            JsonValue::String(s) => {
                parse_with_format(s, &self.format).or_else(|| parse_datetime(s).ok())
            }
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            _ => None,
        };
        parsed.ok_or_else(|| Error::state(format!("Cannot parse datetime cursor value: {raw}")))
    }

    fn output_value(&self, value: &DateTime<Utc>) -> JsonValue {
        JsonValue::String(format_with(*value, &self.format))
    }
}
