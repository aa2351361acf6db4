//! Database connection management
//!
//! The local store uses exactly one SQLite connection for the lifetime of the
//! process. [`ConnectionManager`] owns it: the first call to
//! [`ConnectionManager::connection`] opens the file and applies the tuning
//! pragmas, every later call hands back the same [`StoreHandle`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::database::error::StoreError;

/// Shared handle to the single store connection
pub type StoreHandle = Arc<Mutex<Connection>>;

/// Default lock-wait timeout applied to the connection
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Where the store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file
    File(PathBuf),
    /// Private in-memory database (tests, dry runs)
    Memory,
}

impl StoreLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        StoreLocation::File(path.into())
    }

    /// Path of the database file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreLocation::File(p) => Some(p.as_path()),
            StoreLocation::Memory => None,
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::File(p) => write!(f, "{}", p.display()),
            StoreLocation::Memory => write!(f, ":memory:"),
        }
    }
}

/// Connection tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// How long a writer waits on a lock before failing
    pub busy_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl Tuning {
    /// Apply the tuning pragmas to a freshly opened connection, in order:
    /// WAL journal, foreign keys, busy timeout, NORMAL synchronous mode.
    pub fn apply(&self, conn: &Connection) -> Result<(), StoreError> {
        // journal_mode returns the resulting mode as a row; in-memory
        // databases report "memory" and keep working.
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::connection(format!("Failed to set journal mode: {}", e)))?;
        debug!("journal_mode = {}", mode);

        conn.execute_batch("PRAGMA foreign_keys=ON")
            .map_err(|e| StoreError::connection(format!("Failed to enable foreign keys: {}", e)))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::connection(format!("Failed to set busy timeout: {}", e)))?;

        conn.execute_batch("PRAGMA synchronous=NORMAL")
            .map_err(|e| {
                StoreError::connection(format!("Failed to set synchronous mode: {}", e))
            })?;

        Ok(())
    }
}

/// Open the raw SQLite connection for a location, without tuning
pub fn open_raw(location: &StoreLocation) -> Result<Connection, StoreError> {
    match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::connection(format!(
                            "Failed to create directory '{}': {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            Connection::open(path).map_err(|e| {
                StoreError::connection(format!(
                    "Failed to open database at '{}': {}",
                    path.display(),
                    e
                ))
            })
        }
        StoreLocation::Memory => Connection::open_in_memory().map_err(|e| {
            StoreError::connection(format!("Failed to create in-memory database: {}", e))
        }),
    }
}

/// Owner of the process-wide store connection
///
/// The connection is opened lazily and tuned exactly once. A failed open
/// leaves nothing cached, so the next call starts over. A connection whose
/// tuning failed is dropped rather than handed out.
pub struct ConnectionManager {
    location: StoreLocation,
    tuning: Tuning,
    slot: Mutex<Option<StoreHandle>>,
    opens: AtomicUsize,
    tunings: AtomicUsize,
}

impl ConnectionManager {
    pub fn new(location: StoreLocation, tuning: Tuning) -> Self {
        Self {
            location,
            tuning,
            slot: Mutex::new(None),
            opens: AtomicUsize::new(0),
            tunings: AtomicUsize::new(0),
        }
    }

    /// Get the store connection, opening and tuning it on first use
    pub async fn connection(&self) -> Result<StoreHandle, StoreError> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let conn = open_raw(&self.location)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        info!("Opened local store at {}", self.location);

        self.tunings.fetch_add(1, Ordering::SeqCst);
        self.tuning.apply(&conn)?;
        debug!(
            "Local store tuned (WAL, foreign keys, busy_timeout={}ms, synchronous=NORMAL)",
            self.tuning.busy_timeout.as_millis()
        );

        let handle = Arc::new(Mutex::new(conn));
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Whether the connection has been opened and tuned
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of times the underlying store was successfully opened
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of times tuning was applied
    pub fn tuning_count(&self) -> usize {
        self.tunings.load(Ordering::SeqCst)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_in_memory() {
        let manager = ConnectionManager::new(StoreLocation::Memory, Tuning::default());
        let handle = manager.connection().await.unwrap();

        let conn = handle.lock().await;
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_tuning_applied_to_file_store() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::new(
            StoreLocation::file(dir.path().join("store.sqlite3")),
            Tuning {
                busy_timeout: Duration::from_millis(1234),
            },
        );
        let handle = manager.connection().await.unwrap();
        let conn = handle.lock().await;

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 1234);

        // NORMAL = 1
        let sync: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sync, 1);
    }

    #[tokio::test]
    async fn test_repeated_calls_open_and_tune_once() {
        let manager = ConnectionManager::new(StoreLocation::Memory, Tuning::default());

        let first = manager.connection().await.unwrap();
        for _ in 0..10 {
            let again = manager.connection().await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }

        assert_eq!(manager.open_count(), 1);
        assert_eq!(manager.tuning_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_connection() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ConnectionManager::new(
            StoreLocation::file(dir.path().join("store.sqlite3")),
            Tuning::default(),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.connection().await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(manager.open_count(), 1);
        assert_eq!(manager.tuning_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be makes the open fail
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let manager = ConnectionManager::new(
            StoreLocation::file(blocker.join("store.sqlite3")),
            Tuning::default(),
        );

        let err = manager.connection().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(!manager.is_open().await);
        assert_eq!(manager.open_count(), 0);

        // Clear the obstacle; the next call retries from scratch
        std::fs::remove_file(&blocker).unwrap();
        manager.connection().await.unwrap();
        assert!(manager.is_open().await);
        assert_eq!(manager.open_count(), 1);
        assert_eq!(manager.tuning_count(), 1);
    }

    #[tokio::test]
    async fn test_tuning_failure_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite3");
        // opens lazily, then every pragma fails with "not a database"
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let manager = ConnectionManager::new(StoreLocation::file(&path), Tuning::default());

        let err = manager.connection().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(err.to_string().contains("journal mode"));
        assert!(!manager.is_open().await);
        assert_eq!(manager.open_count(), 1);
        assert_eq!(manager.tuning_count(), 1);

        std::fs::remove_file(&path).unwrap();
        let handle = manager.connection().await.unwrap();
        assert!(manager.is_open().await);
        assert_eq!(manager.open_count(), 2);
        assert_eq!(manager.tuning_count(), 2);

        let fk: i64 = handle
            .lock()
            .await
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
