//! Migration ledger
//!
//! The ledger is the `schema_migrations` table: one row per applied migration,
//! keyed by name. Rows are only ever inserted, by the runner, inside the
//! migration's own transaction.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::Migration;
use crate::database::error::StoreError;

/// Name of the ledger table
pub const LEDGER_TABLE: &str = "schema_migrations";

const CREATE_LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        name TEXT PRIMARY KEY,
        applied_at INTEGER NOT NULL
    );
"#;

/// A persisted ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub name: String,
    /// Unix epoch milliseconds
    pub applied_at: i64,
}

/// Read/create access to the ledger table
pub struct MigrationLedger<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationLedger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the ledger table if it does not exist
    pub fn ensure(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(CREATE_LEDGER)
            .map_err(StoreError::ledger)
    }

    /// Whether the ledger table exists
    pub fn exists(&self) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [LEDGER_TABLE],
                |row| row.get(0),
            )
            .map_err(StoreError::ledger)?;
        Ok(count > 0)
    }

    /// Names of all applied migrations
    pub fn applied_names(&self) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM schema_migrations")
            .map_err(StoreError::ledger)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::ledger)?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(StoreError::ledger)?;
        Ok(names)
    }

    /// All ledger rows, oldest first
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, applied_at FROM schema_migrations ORDER BY applied_at, rowid")
            .map_err(StoreError::ledger)?;
        let entries = stmt
            .query_map([], |row| {
                Ok(LedgerEntry {
                    name: row.get(0)?,
                    applied_at: row.get(1)?,
                })
            })
            .map_err(StoreError::ledger)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::ledger)?;
        Ok(entries)
    }

    /// Look up a single ledger row
    pub fn entry(&self, name: &str) -> Result<Option<LedgerEntry>, StoreError> {
        self.conn
            .query_row(
                "SELECT name, applied_at FROM schema_migrations WHERE name = ?1",
                params![name],
                |row| {
                    Ok(LedgerEntry {
                        name: row.get(0)?,
                        applied_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::ledger)
    }

    pub fn is_applied(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.entry(name)?.is_some())
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .map_err(StoreError::ledger)
    }

    /// Migrations from `catalog` not yet recorded, in catalog order
    ///
    /// Read-only: this never writes to the ledger.
    pub fn pending<'m>(&self, catalog: &'m [Migration]) -> Result<Vec<&'m Migration>, StoreError> {
        let applied = self.applied_names()?;
        Ok(catalog
            .iter()
            .filter(|m| !applied.contains(m.name))
            .collect())
    }
}

/// Insert a ledger row; called by the runner inside the migration transaction
pub(crate) fn record(conn: &Connection, name: &str, applied_at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
        params![name, applied_at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    const M1: Migration = Migration::new("001_alpha", &["CREATE TABLE a (id TEXT)"]);
    const M2: Migration = Migration::new("002_beta", &["CREATE TABLE b (id TEXT)"]);
    const M3: Migration = Migration::new("003_gamma", &["CREATE TABLE c (id TEXT)"]);

    #[test]
    fn test_ensure_is_idempotent() {
        let conn = create_test_db();
        let ledger = MigrationLedger::new(&conn);

        assert!(!ledger.exists().unwrap());
        ledger.ensure().unwrap();
        ledger.ensure().unwrap();
        assert!(ledger.exists().unwrap());
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_ensure_keeps_existing_rows() {
        let conn = create_test_db();
        let ledger = MigrationLedger::new(&conn);
        ledger.ensure().unwrap();
        record(&conn, "001_alpha", 42).unwrap();

        ledger.ensure().unwrap();
        assert_eq!(
            ledger.entry("001_alpha").unwrap(),
            Some(LedgerEntry {
                name: "001_alpha".to_string(),
                applied_at: 42
            })
        );
    }

    #[test]
    fn test_pending_preserves_catalog_order() {
        let conn = create_test_db();
        let ledger = MigrationLedger::new(&conn);
        ledger.ensure().unwrap();
        record(&conn, "002_beta", 1).unwrap();

        let catalog = [M1, M2, M3];
        let pending: Vec<&str> = ledger
            .pending(&catalog)
            .unwrap()
            .iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(pending, vec!["001_alpha", "003_gamma"]);
    }

    #[test]
    fn test_pending_is_not_sorted_by_name() {
        let conn = create_test_db();
        let ledger = MigrationLedger::new(&conn);
        ledger.ensure().unwrap();

        let catalog = [M3, M1, M2];
        let pending: Vec<&str> = ledger
            .pending(&catalog)
            .unwrap()
            .iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(pending, vec!["003_gamma", "001_alpha", "002_beta"]);

        // pending() itself never writes
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_record_rejected() {
        let conn = create_test_db();
        MigrationLedger::new(&conn).ensure().unwrap();
        record(&conn, "001_alpha", 1).unwrap();
        assert!(record(&conn, "001_alpha", 2).is_err());
    }
}
