//! Datetime-based stream cursor
//!
//! Slices a `[start, end]` window into steps, tracks the highest cursor value
//! observed within each window, and advances the persisted cursor when a
//! window is closed.

use super::types::{CursorFactory, StreamCursor};
use crate::error::{Error, Result};
use crate::types::{value_to_string, JsonObject, JsonValue, RequestOption, RequestOptionType};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::warn;

/// Format token for epoch seconds
pub const EPOCH_SECONDS_FORMAT: &str = "%s";

/// Format token for epoch milliseconds
pub const EPOCH_MILLIS_FORMAT: &str = "%ms";

// ============================================================================
// Config
// ============================================================================

/// Configuration for a datetime-based cursor
#[derive(Debug, Clone)]
pub struct DatetimeCursorConfig {
    /// Record field holding the cursor value
    pub cursor_field: String,
    /// Format used for slice boundaries and for parsing cursor values
    pub datetime_format: String,
    /// Additional formats accepted when parsing record cursor values
    pub cursor_datetime_formats: Vec<String>,
    /// Earliest datetime to sync from
    pub start_datetime: DateTime<Utc>,
    /// Latest datetime to sync to (`None` = now)
    pub end_datetime: Option<DateTime<Utc>>,
    /// Window size (`None` = a single window)
    pub step: Option<Duration>,
    /// Smallest unit of the cursor; a window ends one granule before the next starts
    pub cursor_granularity: Duration,
    /// How far to re-read behind the persisted cursor
    pub lookback_window: Duration,
    /// Slice key for the window start
    pub partition_field_start: String,
    /// Slice key for the window end
    pub partition_field_end: String,
    /// Injection of the window start into requests
    pub start_time_option: Option<RequestOption>,
    /// Injection of the window end into requests
    pub end_time_option: Option<RequestOption>,
}

impl DatetimeCursorConfig {
    /// Create a config with RFC 3339 formatting and a single window
    pub fn new(cursor_field: impl Into<String>, start_datetime: DateTime<Utc>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            datetime_format: "%Y-%m-%dT%H:%M:%SZ".to_string(),
            cursor_datetime_formats: Vec::new(),
            start_datetime,
            end_datetime: None,
            step: None,
            cursor_granularity: Duration::zero(),
            lookback_window: Duration::zero(),
            partition_field_start: "start_time".to_string(),
            partition_field_end: "end_time".to_string(),
            start_time_option: None,
            end_time_option: None,
        }
    }

    /// Set the datetime format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    /// Set extra formats accepted for record cursor values
    #[must_use]
    pub fn with_cursor_datetime_formats(mut self, formats: Vec<String>) -> Self {
        self.cursor_datetime_formats = formats;
        self
    }

    /// Set the end datetime
    #[must_use]
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end_datetime = Some(end);
        self
    }

    /// Split the window into steps
    #[must_use]
    pub fn with_step(mut self, step: Duration, cursor_granularity: Duration) -> Self {
        self.step = Some(step);
        self.cursor_granularity = cursor_granularity;
        self
    }

    /// Set the lookback window
    #[must_use]
    pub fn with_lookback_window(mut self, lookback: Duration) -> Self {
        self.lookback_window = lookback;
        self
    }

    /// Inject the window start into requests
    #[must_use]
    pub fn with_start_time_option(mut self, option: RequestOption) -> Self {
        self.start_time_option = Some(option);
        self
    }

    /// Inject the window end into requests
    #[must_use]
    pub fn with_end_time_option(mut self, option: RequestOption) -> Self {
        self.end_time_option = Some(option);
        self
    }

    /// Check the config for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.cursor_field.is_empty() {
            return Err(Error::missing_field("cursor_field"));
        }
        if self.datetime_format.is_empty() {
            return Err(Error::missing_field("datetime_format"));
        }
        if let Some(step) = self.step {
            if step <= Duration::zero() {
                return Err(Error::invalid_value("step", "must be positive"));
            }
            if self.cursor_granularity <= Duration::zero() {
                return Err(Error::invalid_value(
                    "cursor_granularity",
                    "is required when step is set",
                ));
            }
            if self.cursor_granularity >= step {
                return Err(Error::invalid_value(
                    "cursor_granularity",
                    "must be smaller than step",
                ));
            }
        }
        if self.lookback_window < Duration::zero() {
            return Err(Error::invalid_value("lookback_window", "must not be negative"));
        }
        if let Some(end) = self.end_datetime {
            if end < self.start_datetime {
                return Err(Error::invalid_value(
                    "end_datetime",
                    "must not be before start_datetime",
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// A cursor value together with its parsed datetime
#[derive(Debug, Clone)]
struct CursorPoint {
    at: DateTime<Utc>,
    raw: JsonValue,
}

/// Datetime-based cursor for a single stream or partition
#[derive(Debug, Clone)]
pub struct DatetimeBasedCursor {
    config: Arc<DatetimeCursorConfig>,
    /// Persisted cursor position
    cursor: Option<CursorPoint>,
    /// Highest value seen since the cursor was created
    highest_observed: Option<CursorPoint>,
    /// Lookback derived from the previous run's duration
    runtime_lookback: Option<Duration>,
    /// Clock reading used in place of a missing end datetime
    now: DateTime<Utc>,
}

impl DatetimeBasedCursor {
    /// Create a cursor with no state
    pub fn new(config: DatetimeCursorConfig) -> Self {
        Self::with_shared_config(Arc::new(config), Utc::now())
    }

    fn with_shared_config(config: Arc<DatetimeCursorConfig>, now: DateTime<Utc>) -> Self {
        Self {
            config,
            cursor: None,
            highest_observed: None,
            runtime_lookback: None,
            now,
        }
    }

    /// Factory producing cursors that share one config and one clock reading
    pub fn factory(config: DatetimeCursorConfig) -> Arc<dyn CursorFactory> {
        let config = Arc::new(config);
        let now = Utc::now();
        Arc::new(move || -> Box<dyn StreamCursor> {
            Box::new(Self::with_shared_config(Arc::clone(&config), now))
        })
    }

    /// The cursor's config
    pub fn config(&self) -> &DatetimeCursorConfig {
        &self.config
    }

    /// Parse a cursor or boundary value
    pub fn parse_date(&self, value: &JsonValue) -> Option<DateTime<Utc>> {
        let text = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            _ => return None,
        };

        self.config
            .cursor_datetime_formats
            .iter()
            .chain(std::iter::once(&self.config.datetime_format))
            .find_map(|fmt| parse_with_format(&text, fmt))
            .or_else(|| parse_datetime(&text).ok())
    }

    /// Format a datetime with the configured format
    pub fn format_datetime(&self, dt: DateTime<Utc>) -> String {
        format_with(dt, &self.config.datetime_format)
    }

    /// Latest datetime this run may sync to
    pub fn select_best_end_datetime(&self) -> DateTime<Utc> {
        match self.config.end_datetime {
            Some(end) => end.min(self.now),
            None => self.now,
        }
    }

    fn effective_lookback(&self) -> Duration {
        match self.runtime_lookback {
            Some(runtime) => runtime.max(self.config.lookback_window),
            None => self.config.lookback_window,
        }
    }

    /// Earliest datetime this run must sync from
    fn calculate_earliest_possible_value(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        let earliest_start = self.config.start_datetime.min(end);
        match &self.cursor {
            Some(point) => {
                let from_cursor = point
                    .at
                    .checked_sub_signed(self.effective_lookback())
                    .unwrap_or(earliest_start);
                earliest_start.max(from_cursor)
            }
            None => earliest_start,
        }
    }

    fn partition_daterange(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<JsonObject> {
        let mut slices = Vec::new();
        let mut current = start;

        while current <= end {
            let (next_start, slice_end) = match self.config.step {
                Some(step) => match current.checked_add_signed(step) {
                    Some(next) => (Some(next), (next - self.config.cursor_granularity).min(end)),
                    None => (None, end),
                },
                None => (None, end),
            };

            let mut slice = JsonObject::new();
            slice.insert(
                self.config.partition_field_start.clone(),
                JsonValue::String(self.format_datetime(current)),
            );
            slice.insert(
                self.config.partition_field_end.clone(),
                JsonValue::String(self.format_datetime(slice_end)),
            );
            slices.push(slice);

            match next_start {
                Some(next) => current = next,
                None => break,
            }
        }

        slices
    }

    fn boundary(&self, cursor_slice: &JsonObject, field: &str) -> Option<DateTime<Utc>> {
        cursor_slice.get(field).and_then(|v| self.parse_date(v))
    }

    fn is_within_boundaries(
        &self,
        value: DateTime<Utc>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> bool {
        start.map_or(true, |s| value >= s) && end.map_or(true, |e| value <= e)
    }

    fn record_point(&self, record: &JsonObject) -> Option<CursorPoint> {
        let raw = record.get(&self.config.cursor_field)?;
        let at = self.parse_date(raw)?;
        Some(CursorPoint {
            at,
            raw: raw.clone(),
        })
    }
}

fn max_point(a: Option<CursorPoint>, b: Option<CursorPoint>) -> Option<CursorPoint> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.at > a.at { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

impl StreamCursor for DatetimeBasedCursor {
    fn set_initial_state(&mut self, state: &JsonObject) -> Result<()> {
        self.cursor = match state.get(&self.config.cursor_field) {
            None | Some(JsonValue::Null) => None,
            Some(raw) => {
                let at = self.parse_date(raw).ok_or_else(|| {
                    Error::state(format!(
                        "Cannot parse cursor value {raw} for field '{}'",
                        self.config.cursor_field
                    ))
                })?;
                Some(CursorPoint {
                    at,
                    raw: raw.clone(),
                })
            }
        };
        Ok(())
    }

    fn stream_slices(&self) -> Result<Vec<JsonObject>> {
        let end = self.select_best_end_datetime();
        let start = self.calculate_earliest_possible_value(end);
        Ok(self.partition_daterange(start, end))
    }

    fn observe(&mut self, cursor_slice: &JsonObject, record: &JsonObject) -> Result<()> {
        let Some(point) = self.record_point(record) else {
            return Ok(());
        };

        let start = self.boundary(cursor_slice, &self.config.partition_field_start);
        let end = self.boundary(cursor_slice, &self.config.partition_field_end);
        if self.is_within_boundaries(point.at, start, end) {
            self.highest_observed = max_point(self.highest_observed.take(), Some(point));
        }
        Ok(())
    }

    fn close_slice(&mut self, _cursor_slice: &JsonObject) -> Result<()> {
        self.cursor = max_point(self.cursor.take(), self.highest_observed.clone());
        Ok(())
    }

    fn get_stream_state(&self) -> JsonObject {
        let mut state = JsonObject::new();
        if let Some(point) = &self.cursor {
            state.insert(self.config.cursor_field.clone(), point.raw.clone());
        }
        state
    }

    fn should_be_synced(&self, record: &JsonObject) -> bool {
        let Some(raw) = record.get(&self.config.cursor_field) else {
            warn!(
                "Could not find cursor field `{}` in record. The record will be synced",
                self.config.cursor_field
            );
            return true;
        };
        let Some(at) = self.parse_date(raw) else {
            warn!(
                "Could not parse cursor value {} for field `{}`. The record will be synced",
                raw, self.config.cursor_field
            );
            return true;
        };

        let end = self.select_best_end_datetime();
        let start = self.calculate_earliest_possible_value(end);
        self.is_within_boundaries(at, Some(start), Some(end))
    }

    fn is_greater_than_or_equal(&self, first: &JsonObject, second: &JsonObject) -> bool {
        match (self.record_point(first), self.record_point(second)) {
            (Some(a), Some(b)) => a.at >= b.at,
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn request_options(
        &self,
        option_type: RequestOptionType,
        cursor_slice: &JsonObject,
    ) -> JsonObject {
        let mut options = JsonObject::new();
        let injections = [
            (&self.config.start_time_option, &self.config.partition_field_start),
            (&self.config.end_time_option, &self.config.partition_field_end),
        ];
        for (option, field) in injections {
            let Some(option) = option else { continue };
            if option.inject_into != option_type {
                continue;
            }
            if let Some(value) = cursor_slice.get(field) {
                options.insert(
                    option.field_name.clone(),
                    JsonValue::String(value_to_string(value)),
                );
            }
        }
        options
    }

    fn set_runtime_lookback_window(&mut self, seconds: u64) {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        self.runtime_lookback = Duration::try_seconds(seconds);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a string with one specific format
pub(crate) fn parse_with_format(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    match fmt {
        EPOCH_SECONDS_FORMAT => s
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        EPOCH_MILLIS_FORMAT => s
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
            }
            let nd = NaiveDate::parse_from_str(s, fmt).ok()?;
            let ndt = nd.and_hms_opt(0, 0, 0)?;
            Some(DateTime::from_naive_utc_and_offset(ndt, Utc))
        }
    }
}

/// Format a datetime with one specific format
pub(crate) fn format_with(dt: DateTime<Utc>, fmt: &str) -> String {
    match fmt {
        EPOCH_SECONDS_FORMAT => dt.timestamp().to_string(),
        EPOCH_MILLIS_FORMAT => dt.timestamp_millis().to_string(),
        _ => dt.format(fmt).to_string(),
    }
}

/// Parse a datetime string into UTC DateTime
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC 3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common formats
    let formats = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
                return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
            }
        }
    }

    Err(Error::config(format!("Invalid datetime format: {s}")))
}

/// Parse a duration string like "1d", "2h", "30m"
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    let (num_str, suffix) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, "d")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('w') {
        (stripped, "w")
    } else {
        // Assume days if no suffix
        (s, "d")
    };

    let num: i64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {num_str}")))?;

    let duration = match suffix {
        "w" => Duration::try_weeks(num),
        "d" => Duration::try_days(num),
        "h" => Duration::try_hours(num),
        "m" => Duration::try_minutes(num),
        "s" => Duration::try_seconds(num),
        "ms" => Duration::try_milliseconds(num),
        _ => None,
    };

    duration.ok_or_else(|| Error::config(format!("Duration out of range: {s}")))
}
