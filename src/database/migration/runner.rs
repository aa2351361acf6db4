//! Migration runner
//!
//! Applies pending migrations one transaction each. The ledger row of a
//! migration is the last write of its transaction, so a migration is either
//! fully applied and recorded or not there at all.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ledger::{self, MigrationLedger};
use super::Migration;
use crate::database::core::normalized_statements;
use crate::database::error::StoreError;

/// Result of a `run_all` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing was pending
    UpToDate,
    /// These migrations were applied, in order
    Applied { names: Vec<String> },
    /// Another `run_all` was in flight; nothing was done
    AlreadyRunning,
}

/// Applies migrations against a connection
///
/// Holds the re-entrancy flag that keeps two `run_all` calls from
/// overlapping.
#[derive(Debug, Default)]
pub struct MigrationRunner {
    running: AtomicBool,
}

/// Clears the running flag when `run_all` returns, on every path
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `run_all` call is currently in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Apply a single migration in its own transaction
    ///
    /// Statements run in list order after normalization; empty statements
    /// are skipped. The ledger row is inserted last. On any error the
    /// transaction is dropped, which rolls it back.
    pub fn apply(&self, conn: &mut Connection, migration: &Migration) -> Result<(), StoreError> {
        let statements = normalized_statements(migration.statements);
        let fail = |statement: usize, err: rusqlite::Error| StoreError::MigrationStatement {
            migration: migration.name.to_string(),
            statement,
            message: err.to_string(),
        };

        let tx = conn.transaction().map_err(|e| fail(0, e))?;

        for (idx, sql) in statements.iter().enumerate() {
            debug!("{} [{}]: {}", migration.name, idx, sql);
            tx.execute_batch(sql).map_err(|e| fail(idx, e))?;
        }

        let applied_at = Utc::now().timestamp_millis();
        ledger::record(&tx, migration.name, applied_at).map_err(|e| fail(statements.len(), e))?;

        tx.commit().map_err(|e| fail(statements.len(), e))?;

        if statements.is_empty() {
            info!("Recorded empty migration {}", migration.name);
        } else {
            info!(
                "Applied migration {} ({} statements)",
                migration.name,
                statements.len()
            );
        }
        Ok(())
    }

    /// Apply every pending migration of `catalog`, strictly in order
    ///
    /// Stops at the first failure; later migrations are not attempted.
    /// A call made while another is in flight is a no-op.
    pub fn run_all(
        &self,
        conn: &mut Connection,
        catalog: &[Migration],
    ) -> Result<RunOutcome, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Migrations already running, skipping concurrent run");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let pending: Vec<Migration> = MigrationLedger::new(conn)
            .pending(catalog)?
            .into_iter()
            .copied()
            .collect();

        if pending.is_empty() {
            debug!("No pending migrations");
            return Ok(RunOutcome::UpToDate);
        }

        info!("Applying {} pending migration(s)", pending.len());
        let mut names = Vec::with_capacity(pending.len());
        for migration in &pending {
            self.apply(conn, migration)?;
            names.push(migration.name.to_string());
        }

        Ok(RunOutcome::Applied { names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys=ON", []).unwrap();
        MigrationLedger::new(&conn).ensure().unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn test_apply_records_ledger_row() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let migration = Migration::new("001", &["CREATE TABLE t (id TEXT);"]);

        runner.apply(&mut conn, &migration).unwrap();

        assert!(table_exists(&conn, "t"));
        let entry = MigrationLedger::new(&conn).entry("001").unwrap().unwrap();
        assert!(entry.applied_at > 0);
    }

    #[test]
    fn test_zero_pending_is_noop() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();

        assert_eq!(runner.run_all(&mut conn, &[]).unwrap(), RunOutcome::UpToDate);

        let catalog = [Migration::new("001", &["CREATE TABLE t (id TEXT)"])];
        runner.run_all(&mut conn, &catalog).unwrap();
        assert_eq!(
            runner.run_all(&mut conn, &catalog).unwrap(),
            RunOutcome::UpToDate
        );
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_empty_migration_is_recorded() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let catalog = [Migration::new(
            "001_placeholder",
            &["-- reserved", "/* nothing */", "   "],
        )];

        let outcome = runner.run_all(&mut conn, &catalog).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Applied {
                names: vec!["001_placeholder".to_string()]
            }
        );
        assert!(MigrationLedger::new(&conn)
            .is_applied("001_placeholder")
            .unwrap());
    }

    #[test]
    fn test_failure_rolls_back_whole_migration() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let migration = Migration::new(
            "001_broken",
            &[
                "CREATE TABLE a (id TEXT)",
                "CREATE TABLE b (id TEXT REFERENCES nowhere(id), broken syntax here",
                "CREATE TABLE c (id TEXT)",
            ],
        );

        let err = runner.apply(&mut conn, &migration).unwrap_err();
        match err {
            StoreError::MigrationStatement {
                migration,
                statement,
                ..
            } => {
                assert_eq!(migration, "001_broken");
                assert_eq!(statement, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!table_exists(&conn, "a"));
        assert!(!table_exists(&conn, "b"));
        assert!(!table_exists(&conn, "c"));
        assert!(!MigrationLedger::new(&conn).is_applied("001_broken").unwrap());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let catalog = [
            Migration::new("001_ok", &["CREATE TABLE one (id TEXT)"]),
            Migration::new("002_bad", &["INSERT INTO missing_table VALUES (1)"]),
            Migration::new("003_never", &["CREATE TABLE three (id TEXT)"]),
        ];

        let err = runner.run_all(&mut conn, &catalog).unwrap_err();
        assert!(err.is_migration_failure());

        let ledger = MigrationLedger::new(&conn);
        assert!(ledger.is_applied("001_ok").unwrap());
        assert!(!ledger.is_applied("002_bad").unwrap());
        assert!(!ledger.is_applied("003_never").unwrap());
        assert!(table_exists(&conn, "one"));
        assert!(!table_exists(&conn, "three"));

        // the guard is released even on failure
        assert!(!runner.is_running());
    }

    #[test]
    fn test_run_all_applies_each_name_once() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let catalog = [
            Migration::new("001_counter", &["CREATE TABLE counter (n INTEGER)"]),
            Migration::new("002_seed", &["INSERT INTO counter (n) VALUES (1)"]),
        ];

        for _ in 0..3 {
            runner.run_all(&mut conn, &catalog).unwrap();
        }

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM counter", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(MigrationLedger::new(&conn).count().unwrap(), 2);
    }

    #[test]
    fn test_run_all_while_running_is_noop() {
        let mut conn = create_test_db();
        let runner = MigrationRunner::new();
        let catalog = [Migration::new("001", &["CREATE TABLE t (id TEXT)"])];

        runner.running.store(true, Ordering::SeqCst);
        assert_eq!(
            runner.run_all(&mut conn, &catalog).unwrap(),
            RunOutcome::AlreadyRunning
        );
        assert!(!table_exists(&conn, "t"));

        runner.running.store(false, Ordering::SeqCst);
        assert_eq!(
            runner.run_all(&mut conn, &catalog).unwrap(),
            RunOutcome::Applied {
                names: vec!["001".to_string()]
            }
        );
    }
}
