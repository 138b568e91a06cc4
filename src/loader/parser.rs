//! YAML parser for stream definitions
//!
//! Parses and validates definition files. JSON is accepted as YAML.

use crate::error::{Error, Result};
use crate::loader::types::{MigrationDefinition, StreamDefinition, SyncDefinition};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a definition from a file path
pub fn load_definition(path: impl AsRef<Path>) -> Result<SyncDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read definition file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_definition_from_str(&content)
}

/// Load a definition from a YAML string
pub fn load_definition_from_str(yaml: &str) -> Result<SyncDefinition> {
    let def: SyncDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse definition YAML: {e}")))?;

    validate_definition(&def)?;
    debug!(streams = def.streams.len(), "Loaded stream definitions");
    Ok(def)
}

/// Validate a definition
fn validate_definition(def: &SyncDefinition) -> Result<()> {
    if def.streams.is_empty() {
        return Err(Error::config("Definition must have at least one stream"));
    }

    let stream_names: HashSet<_> = def.streams.iter().map(|s| &s.name).collect();
    if stream_names.len() != def.streams.len() {
        return Err(Error::config("Duplicate stream names found"));
    }

    for stream in &def.streams {
        validate_stream(stream)?;
    }

    Ok(())
}

/// Validate a stream definition
fn validate_stream(stream: &StreamDefinition) -> Result<()> {
    if stream.name.is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    stream.cursor.to_config().map_err(|e| {
        Error::config(format!("Stream '{}' has an invalid cursor: {e}", stream.name))
    })?;

    if stream.partition_limit == Some(0) {
        return Err(Error::invalid_value(
            "partition_limit",
            format!("must be at least 1 for stream '{}'", stream.name),
        ));
    }

    let legacy_at = stream
        .state_migrations
        .iter()
        .position(|m| *m == MigrationDefinition::LegacyToPerPartition);
    if let Some(legacy_at) = legacy_at {
        if !stream.partition_router.is_parent() {
            return Err(Error::config(format!(
                "Stream '{}' uses legacy_to_per_partition without a parent partition router",
                stream.name
            )));
        }

        // Parent router partitions always carry `parent_slice`
        let parent_slice_follows = stream.state_migrations[legacy_at + 1..]
            .iter()
            .any(|m| matches!(m, MigrationDefinition::ParentSlice { .. }));
        if !parent_slice_follows {
            return Err(Error::config(format!(
                "Stream '{}' uses legacy_to_per_partition without a parent_slice migration after it",
                stream.name
            )));
        }
    }

    Ok(())
}
