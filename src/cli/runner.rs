//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat, StateShape};
use crate::engine::{InMemorySource, Message, SyncConfig, SyncEngine};
use crate::error::{Error, Result, ResultExt};
use crate::loader::{load_definition, ParentRecords, StreamDefinition, SyncDefinition};
use crate::state::{DateTimeConverter, EpochValueConverter, StateManager, StreamStateConverter};
use crate::types::{JsonObject, JsonValue, LogLevel};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Migrate => self.migrate().await,
            Commands::Slices { parent_records } => self.slices(parent_records.as_deref()),
            Commands::Replay {
                records,
                parent_records,
                max_slices,
                state_per_slice,
                no_fail_fast,
            } => {
                let config = SyncConfig::new()
                    .with_max_slices(max_slices.unwrap_or(0))
                    .with_state_per_slice(*state_per_slice)
                    .with_fail_fast(!no_fail_fast);
                self.replay(records, parent_records.as_deref(), config).await
            }
            Commands::Convert {
                to,
                cursor_field,
                epoch,
            } => self.convert(*to, cursor_field, *epoch).await,
            Commands::Validate => self.validate(),
        }
    }

    /// Load the stream definition file
    fn load_definition(&self) -> Result<SyncDefinition> {
        let path = self
            .cli
            .definition
            .as_ref()
            .ok_or_else(|| Error::config("Definition file not specified (use -c flag)"))?;
        load_definition(path)
    }

    /// Pick the stream named by `--stream`, or the only stream of the definition
    fn select_stream<'a>(&self, def: &'a SyncDefinition) -> Result<&'a StreamDefinition> {
        match (&self.cli.stream, def.streams.as_slice()) {
            (Some(name), _) => def.stream(name),
            (None, [only]) => Ok(only),
            (None, _) => Err(Error::config(format!(
                "Definition has several streams ({}), pick one with --stream",
                def.stream_names().join(", ")
            ))),
        }
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Load parent records, keyed by parent stream name
    fn load_parent_records(path: Option<&Path>) -> Result<ParentRecords> {
        let Some(path) = path else {
            return Ok(ParentRecords::new());
        };
        let content = read_file(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("Invalid parent records JSON: {e}")))
    }

    /// Apply migrations to the stored state
    async fn migrate(&self) -> Result<()> {
        let def = self.load_definition()?;
        let stream = self.select_stream(&def)?;
        let state = self.load_state()?;

        let router = stream.build_router(&ParentRecords::new());
        let chain = stream.build_migrations(router.as_ref());
        let stored = state.get_stream_state(&stream.name).await?;

        let migrated = chain.apply(&JsonValue::Object(stored))?;
        info!(stream = %stream.name, migrations = ?chain.names(), "Migrated state");
        self.output_message(&Message::state(&stream.name, migrated));
        Ok(())
    }

    /// Print the slices of a full traversal
    fn slices(&self, parent_records: Option<&Path>) -> Result<()> {
        let def = self.load_definition()?;
        let stream = self.select_stream(&def)?;
        let parents = Self::load_parent_records(parent_records)?;

        let router = stream.build_router(&parents);
        let mut cursor = stream.build_cursor(router)?;
        for slice in cursor.stream_slices()? {
            self.output_value(&json!({
                "type": "SLICE",
                "stream": stream.name,
                "slice": slice.to_value()
            }));
        }
        Ok(())
    }

    /// Read recorded records through the engine
    async fn replay(
        &self,
        records: &Path,
        parent_records: Option<&Path>,
        config: SyncConfig,
    ) -> Result<()> {
        let sync_start = Instant::now();
        let def = self.load_definition()?;
        let stream = self.select_stream(&def)?;
        let parents = Self::load_parent_records(parent_records)?;

        let content = read_file(records)?;
        let value: JsonValue = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("Invalid records JSON: {e}")))?;
        let source = InMemorySource::from_value(&value)
            .with_context(|| format!("Invalid records file {}", records.display()))?
            .with_window(stream.cursor.to_config()?);

        let router = stream.build_router(&parents);
        let migrations = stream.build_migrations(router.as_ref());
        let mut cursor = stream.build_cursor(router)?;

        let mut engine = SyncEngine::new(self.load_state()?).with_config(config);
        let messages = engine.sync_stream(&mut cursor, &migrations, &source).await?;
        for message in &messages {
            if self.should_output(message) {
                self.output_message(message);
            }
        }

        let stats = engine.stats();
        debug!(
            records = stats.records_synced,
            slices = stats.slices_read,
            elapsed_ms = sync_start.elapsed().as_millis() as u64,
            "Replay finished"
        );
        Ok(())
    }

    /// Convert the stream's state between shapes
    async fn convert(&self, to: StateShape, cursor_field: &str, epoch: bool) -> Result<()> {
        let stream = match &self.cli.stream {
            Some(name) => name.clone(),
            None => self.select_stream(&self.load_definition()?)?.name.clone(),
        };
        let state = self.load_state()?;
        let stored = state.get_stream_state(&stream).await?;

        let converted = if epoch {
            convert_state(&EpochValueConverter, to, cursor_field, &stored)?
        } else {
            convert_state(&DateTimeConverter::default(), to, cursor_field, &stored)?
        };
        self.output_message(&Message::state(stream, JsonValue::Object(converted)));
        Ok(())
    }

    /// Validate the stream definition
    fn validate(&self) -> Result<()> {
        let def = self.load_definition()?;

        for stream in &def.streams {
            let router = stream.build_router(&ParentRecords::new());
            let chain = stream.build_migrations(router.as_ref());
            stream.build_cursor(router)?;
            debug!(stream = %stream.name, migrations = ?chain.names(), "Stream is valid");
        }

        self.output_message(&Message::info(format!(
            "Definition is valid with {} streams: {}",
            def.streams.len(),
            def.stream_names().join(", ")
        )));
        Ok(())
    }

    fn should_output(&self, message: &Message) -> bool {
        match message {
            Message::Log {
                level: LogLevel::Debug | LogLevel::Trace,
                ..
            } => self.cli.verbose,
            _ => true,
        }
    }

    /// Output an engine message
    fn output_message(&self, msg: &Message) {
        let value = match msg {
            Message::Record { stream, data } => json!({
                "type": "RECORD",
                "record": {
                    "stream": stream,
                    "data": data,
                    "emitted_at": chrono::Utc::now().timestamp_millis()
                }
            }),
            Message::State { stream, data } => json!({
                "type": "STATE",
                "state": {
                    "type": "STREAM",
                    "stream": {
                        "stream_descriptor": {
                            "name": stream
                        },
                        "stream_state": data
                    }
                }
            }),
            Message::Log { level, message } => json!({
                "type": "LOG",
                "log": {
                    "level": level,
                    "message": message
                }
            }),
        };
        self.output_value(&value);
    }

    fn output_value(&self, msg: &JsonValue) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })
}

/// Run a converter in the requested direction
fn convert_state<C: StreamStateConverter>(
    converter: &C,
    to: StateShape,
    cursor_field: &str,
    state: &JsonObject,
) -> Result<JsonObject> {
    match to {
        StateShape::Sequential => {
            if converter.is_state_message_compatible(state) {
                converter.convert_to_sequential_state(cursor_field, state)
            } else {
                Ok(state.clone())
            }
        }
        StateShape::Concurrent => {
            let concurrent = converter.convert_from_sequential_state(cursor_field, state)?;
            converter.merge_slices(&concurrent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_convert_round_trip_epoch() {
        let sequential = json!({"id": 42}).as_object().unwrap().clone();

        let concurrent =
            convert_state(&EpochValueConverter, StateShape::Concurrent, "id", &sequential).unwrap();
        assert_eq!(concurrent["state_type"], json!("integer"));
        assert_eq!(concurrent["slices"], json!([{"start": 0, "end": 42}]));

        let back =
            convert_state(&EpochValueConverter, StateShape::Sequential, "id", &concurrent).unwrap();
        assert_eq!(back, sequential);
    }

    #[test]
    fn test_convert_sequential_leaves_flat_state() {
        let flat = json!({"updated_at": "2024-01-01T00:00:00Z"})
            .as_object()
            .unwrap()
            .clone();
        let out = convert_state(
            &DateTimeConverter::default(),
            StateShape::Sequential,
            "updated_at",
            &flat,
        )
        .unwrap();
        assert_eq!(out, flat);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_file(Path::new("/nonexistent/records.json")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
