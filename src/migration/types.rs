//! Migration contract and chain

use crate::error::{Error, Result};
use crate::types::JsonValue;
use std::fmt;
use tracing::{debug, info};

/// A one-time rewrite of a persisted state shape
///
/// Migrations are pure: they borrow the incoming state and return a new one.
/// `should_migrate` never fails; a state a migration does not recognise is
/// simply not its concern.
pub trait StateMigration: Send + Sync + fmt::Debug {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Whether this migration recognises `state`
    fn should_migrate(&self, state: &JsonValue) -> bool;

    /// Rewrite `state`; fails if `should_migrate` would return false
    fn migrate(&self, state: &JsonValue) -> Result<JsonValue>;
}

/// Ordered migrations applied to a state before a cursor is seeded
#[derive(Debug, Default)]
pub struct MigrationChain {
    migrations: Vec<Box<dyn StateMigration>>,
}

impl MigrationChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration
    #[must_use]
    pub fn with_migration(mut self, migration: impl StateMigration + 'static) -> Self {
        self.push(Box::new(migration));
        self
    }

    /// Append a boxed migration
    pub fn push(&mut self, migration: Box<dyn StateMigration>) {
        self.migrations.push(migration);
    }

    /// Number of migrations
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the chain has no migrations
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Migration names, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    /// Apply every migration that recognises the state, each at most once
    ///
    /// Fails if more than one migration recognises the incoming state, since
    /// the result would depend on their order.
    pub fn apply(&self, state: &JsonValue) -> Result<JsonValue> {
        let claimed: Vec<&str> = self
            .migrations
            .iter()
            .filter(|m| m.should_migrate(state))
            .map(|m| m.name())
            .collect();
        if claimed.len() > 1 {
            return Err(Error::migration(
                claimed.join(", "),
                "more than one migration matches the persisted state",
            ));
        }

        let mut current = state.clone();
        for migration in &self.migrations {
            if migration.should_migrate(&current) {
                current = migration.migrate(&current)?;
                info!(migration = migration.name(), "Applied state migration");
            } else {
                debug!(migration = migration.name(), "State migration not applicable");
            }
        }
        Ok(current)
    }
}
