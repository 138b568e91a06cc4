//! Build runtime components from stream definitions

use crate::cursor::{
    parse_datetime, parse_duration, DatetimeBasedCursor, DatetimeCursorConfig,
    PerPartitionWithGlobalCursor,
};
use crate::error::{Error, Result};
use crate::loader::types::{
    CursorDefinition, MigrationDefinition, PartitionRouterDefinition, StreamDefinition,
    SyncDefinition,
};
use crate::migration::{
    FlattenSinglePartitionStateMigration, LegacyToPerPartitionStateMigration, MigrationChain,
    ParentSliceStateMigration,
};
use crate::partition::{ListRouter, ParentRouter, PartitionRouter};
use crate::types::JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Records of parent streams, keyed by stream name
pub type ParentRecords = HashMap<String, Vec<JsonValue>>;

impl SyncDefinition {
    /// Find a stream by name
    pub fn stream(&self, name: &str) -> Result<&StreamDefinition> {
        self.streams
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::stream_not_found(name))
    }

    /// Names of all streams, in definition order
    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }
}

impl CursorDefinition {
    /// Convert to a validated cursor config
    pub fn to_config(&self) -> Result<DatetimeCursorConfig> {
        let start = parse_datetime(&self.start_datetime)
            .map_err(|e| Error::invalid_value("start_datetime", e.to_string()))?;

        let mut config = DatetimeCursorConfig::new(&self.cursor_field, start)
            .with_format(&self.datetime_format)
            .with_cursor_datetime_formats(self.cursor_datetime_formats.clone());

        if let Some(end) = &self.end_datetime {
            let end = parse_datetime(end)
                .map_err(|e| Error::invalid_value("end_datetime", e.to_string()))?;
            config = config.with_end(end);
        }

        match (&self.step, &self.cursor_granularity) {
            (Some(step), Some(granularity)) => {
                config = config.with_step(
                    duration("step", step)?,
                    duration("cursor_granularity", granularity)?,
                );
            }
            (Some(_), None) => return Err(Error::missing_field("cursor_granularity")),
            (None, _) => {}
        }

        if let Some(lookback) = &self.lookback_window {
            config = config.with_lookback_window(duration("lookback_window", lookback)?);
        }
        if let Some(option) = &self.start_time_option {
            config = config.with_start_time_option(option.clone());
        }
        if let Some(option) = &self.end_time_option {
            config = config.with_end_time_option(option.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn duration(field: &str, value: &str) -> Result<chrono::Duration> {
    parse_duration(value).map_err(|e| Error::invalid_value(field, e.to_string()))
}

impl PartitionRouterDefinition {
    /// Build the router, feeding parent routers the given parent records
    pub fn build(&self, parent_records: &ParentRecords) -> Arc<dyn PartitionRouter> {
        match self {
            Self::List {
                values,
                partition_field,
                request_option,
            } => {
                let mut router = ListRouter::new(values.clone(), partition_field);
                if let Some(option) = request_option {
                    router = router.with_request_option(option.clone());
                }
                Arc::new(router)
            }
            Self::Parent {
                parent_stream_configs,
            } => {
                let mut router = ParentRouter::new(parent_stream_configs.clone());
                for config in parent_stream_configs {
                    if let Some(records) = parent_records.get(&config.stream) {
                        router.set_records(&config.stream, records.clone());
                    }
                }
                Arc::new(router)
            }
        }
    }

    /// Whether this router is backed by parent streams
    pub fn is_parent(&self) -> bool {
        matches!(self, Self::Parent { .. })
    }
}

impl StreamDefinition {
    /// Build the stream's partition router
    pub fn build_router(&self, parent_records: &ParentRecords) -> Arc<dyn PartitionRouter> {
        self.partition_router.build(parent_records)
    }

    /// Build the stream's cursor on top of a router
    pub fn build_cursor(
        &self,
        router: Arc<dyn PartitionRouter>,
    ) -> Result<PerPartitionWithGlobalCursor> {
        let config = self.cursor.to_config()?;
        let cursor = PerPartitionWithGlobalCursor::new(
            &self.name,
            DatetimeBasedCursor::factory(config),
            router,
        );
        match self.partition_limit {
            Some(limit) => cursor.with_partition_limit(limit),
            None => Ok(cursor),
        }
    }

    /// Build the stream's migration chain
    pub fn build_migrations(&self, router: &dyn PartitionRouter) -> MigrationChain {
        let mut chain = MigrationChain::new();
        for migration in &self.state_migrations {
            match migration {
                MigrationDefinition::LegacyToPerPartition => {
                    chain.push(Box::new(LegacyToPerPartitionStateMigration::for_router(
                        &self.cursor.cursor_field,
                        router,
                    )));
                }
                MigrationDefinition::ParentSlice { parent_reference } => {
                    let mut parent_slice = ParentSliceStateMigration::new();
                    if let Some(reference) = parent_reference {
                        parent_slice = parent_slice.with_parent_reference(reference.clone());
                    }
                    chain.push(Box::new(parent_slice));
                }
                MigrationDefinition::FlattenSinglePartition => {
                    chain.push(Box::new(FlattenSinglePartitionStateMigration::new()));
                }
            }
        }
        chain
    }
}
