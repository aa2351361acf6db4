//! Schema migrations
//!
//! A migration is a named, ordered list of SQL statements. The catalog is a
//! static slice: its order is the only source of ordering truth, and the
//! ledger tracks applied migrations by name only. Once a migration has
//! shipped its name must never be reused or moved.

pub mod catalog;
mod ledger;
mod runner;

pub use ledger::{LedgerEntry, MigrationLedger, LEDGER_TABLE};
pub use runner::{MigrationRunner, RunOutcome};

use std::collections::HashSet;

use crate::database::error::StoreError;

/// A named schema change applied exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Unique identifier recorded in the ledger
    pub name: &'static str,
    /// Raw statements, executed in order after normalization
    pub statements: &'static [&'static str],
}

impl Migration {
    pub const fn new(name: &'static str, statements: &'static [&'static str]) -> Self {
        Self { name, statements }
    }
}

/// Check that every migration has a non-empty, unique name
pub fn validate_catalog(migrations: &[Migration]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for migration in migrations {
        if migration.name.trim().is_empty() {
            return Err(StoreError::InvalidCatalog {
                message: "migration with empty name".to_string(),
            });
        }
        if !seen.insert(migration.name) {
            return Err(StoreError::InvalidCatalog {
                message: format!("duplicate migration name '{}'", migration.name),
            });
        }
    }
    Ok(())
}
