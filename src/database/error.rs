//! Error types for the local store runtime
//!
//! `StoreError` is what `initialize()` and `safe_handle()` surface to the rest
//! of the application. It is `Clone` because a failed initialization is cached
//! and handed to every later caller.

use std::fmt;

// =============================================================================
// Store Error
// =============================================================================

/// Errors that can escape the store runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Opening or tuning the underlying store failed
    Connection { message: String },

    /// Creating or reading the migration ledger failed
    Ledger { message: String },

    /// A statement (or the ledger insert) of a migration failed; the
    /// migration's transaction was rolled back
    MigrationStatement {
        migration: String,
        /// Zero-based index into the migration's normalized statements.
        /// Equal to the statement count when the ledger insert failed.
        statement: usize,
        message: String,
    },

    /// The migration catalog is malformed (duplicate or empty names)
    InvalidCatalog { message: String },

    /// Another migration run was in flight, so nothing was applied
    MigrationsInProgress,

    /// The store was accessed before initialization completed
    NotInitialized,
}

impl StoreError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub(crate) fn ledger(err: rusqlite::Error) -> Self {
        Self::Ledger {
            message: err.to_string(),
        }
    }

    /// Whether this error came out of a migration statement
    pub fn is_migration_failure(&self) -> bool {
        matches!(self, Self::MigrationStatement { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection { message } => {
                write!(f, "Failed to open local store: {}", message)
            }
            StoreError::Ledger { message } => {
                write!(f, "Migration ledger error: {}", message)
            }
            StoreError::MigrationStatement {
                migration,
                statement,
                message,
            } => write!(
                f,
                "Migration '{}' failed at statement {}: {}",
                migration, statement, message
            ),
            StoreError::InvalidCatalog { message } => {
                write!(f, "Invalid migration catalog: {}", message)
            }
            StoreError::MigrationsInProgress => {
                write!(f, "Migrations are already being applied to the local store")
            }
            StoreError::NotInitialized => write!(f, "Local store is not initialized"),
        }
    }
}

impl std::error::Error for StoreError {}
