//! Pre-migration snapshots
//!
//! Before pending migrations run, the runtime copies the store into the
//! snapshot directory with `VACUUM INTO`, which produces a consistent,
//! compacted copy even while the database is in WAL mode. Only the newest
//! few snapshots are kept.
//!
//! Each store gets its own directory, `<root>/<stem>/`, and snapshot files
//! are named `{stem}-{unix_micros}-{tag}.sqlite3` inside it. Stores sharing
//! a root never see each other's files.
//!
//! Nothing in here is allowed to block a migration: the runtime logs and
//! discards every [`SnapshotError`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default number of snapshots to keep
pub const DEFAULT_SNAPSHOT_KEEP: usize = 3;

/// Tag used for snapshots taken by the runtime before migrating
pub const PRE_MIGRATION_TAG: &str = "pre-migration";

const SNAPSHOT_EXT: &str = "sqlite3";

// =============================================================================
// Snapshot Reference
// =============================================================================

/// A snapshot file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRef {
    pub path: PathBuf,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    micros: i64,
}

// =============================================================================
// Snapshot Guard
// =============================================================================

/// Creates, lists and rotates snapshots of one store
pub struct SnapshotGuard {
    dir: PathBuf,
    stem: String,
    keep: usize,
    #[cfg(test)]
    rotation_fault: bool,
}

impl SnapshotGuard {
    /// Create a guard for the store named `stem`, writing into `root/stem`
    pub fn new(root: impl Into<PathBuf>, stem: impl Into<String>, keep: usize) -> Self {
        let stem = stem.into();
        Self {
            dir: root.into().join(&stem),
            stem,
            keep,
            #[cfg(test)]
            rotation_fault: false,
        }
    }

    /// Make every `rotate` call fail
    #[cfg(test)]
    pub(crate) fn with_rotation_fault(mut self) -> Self {
        self.rotation_fault = true;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configured retention count
    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Copy the store behind `conn` into a new snapshot file
    pub fn create_snapshot(&self, conn: &Connection, tag: &str) -> Result<SnapshotRef, SnapshotError> {
        validate_tag(tag)?;
        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;

        let now = Utc::now();
        let micros = now.timestamp_micros();
        let path = self
            .dir
            .join(format!("{}-{}-{}.{}", self.stem, micros, tag, SNAPSHOT_EXT));

        let target = path.to_string_lossy().to_string();
        conn.execute("VACUUM INTO ?1", [target.as_str()])
            .map_err(SnapshotError::Sqlite)?;

        info!("Created snapshot {}", path.display());
        Ok(SnapshotRef {
            path,
            tag: tag.to_string(),
            created_at: now,
            micros,
        })
    }

    /// All snapshots of this store, newest first
    pub fn list(&self) -> Result<Vec<SnapshotRef>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| SnapshotError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(snapshot) = self.parse_name(&path) {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by(|a, b| b.micros.cmp(&a.micros));
        Ok(snapshots)
    }

    /// Delete the oldest snapshots beyond `keep`, returning what was removed
    pub fn rotate(&self, keep: usize) -> Result<Vec<PathBuf>, SnapshotError> {
        #[cfg(test)]
        {
            if self.rotation_fault {
                return Err(SnapshotError::io(
                    &self.dir,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "rotation refused"),
                ));
            }
        }

        let mut removed = Vec::new();
        for snapshot in self.list()?.into_iter().skip(keep) {
            fs::remove_file(&snapshot.path).map_err(|e| SnapshotError::io(&snapshot.path, e))?;
            debug!("Removed old snapshot {}", snapshot.path.display());
            removed.push(snapshot.path);
        }
        Ok(removed)
    }

    fn parse_name(&self, path: &Path) -> Option<SnapshotRef> {
        let name = path.file_name()?.to_str()?;
        let rest = name
            .strip_prefix(self.stem.as_str())?
            .strip_prefix('-')?
            .strip_suffix(SNAPSHOT_EXT)?
            .strip_suffix('.')?;
        let (micros, tag) = rest.split_once('-')?;
        let micros: i64 = micros.parse().ok()?;
        let created_at = DateTime::from_timestamp_micros(micros)?;

        Some(SnapshotRef {
            path: path.to_path_buf(),
            tag: tag.to_string(),
            created_at,
            micros,
        })
    }
}

/// Replace the store file at `target` with the contents of `snapshot`
///
/// The store must not be open. The snapshot is copied next to the target
/// and checked before it is renamed into place, so a failed restore leaves
/// the store and its `-wal`/`-shm` side files untouched. The stale side
/// files are removed only after the rename, so SQLite does not replay them
/// over the restored copy.
pub fn restore_snapshot(snapshot: &Path, target: &Path) -> Result<(), SnapshotError> {
    if !snapshot.is_file() {
        return Err(SnapshotError::io(
            snapshot,
            std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot file not found"),
        ));
    }

    let staging = with_suffix(target, ".restore");
    let staged = stage_restore(snapshot, &staging)
        .and_then(|_| fs::rename(&staging, target).map_err(|e| SnapshotError::io(target, e)));
    if let Err(e) = staged {
        if staging.exists() {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
        }
        return Err(e);
    }

    for suffix in ["-wal", "-shm"] {
        let side = with_suffix(target, suffix);
        if side.exists() {
            fs::remove_file(&side).map_err(|e| SnapshotError::io(&side, e))?;
        }
    }

    info!(
        "Restored {} from snapshot {}",
        target.display(),
        snapshot.display()
    );
    Ok(())
}

/// Copy `snapshot` to `staging` and check the copy is a sound SQLite file
fn stage_restore(snapshot: &Path, staging: &Path) -> Result<(), SnapshotError> {
    fs::copy(snapshot, staging).map_err(|e| SnapshotError::io(staging, e))?;

    let conn = Connection::open_with_flags(staging, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .map_err(SnapshotError::Sqlite)?;
    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(SnapshotError::Sqlite)?;
    if check != "ok" {
        return Err(SnapshotError::Corrupt {
            path: snapshot.to_path_buf(),
            message: check,
        });
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn validate_tag(tag: &str) -> Result<(), SnapshotError> {
    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SnapshotError::InvalidTag(tag.to_string()))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while taking or pruning snapshots
#[derive(Debug)]
pub enum SnapshotError {
    /// Filesystem failure on the given path
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// SQLite refused to write the snapshot
    Sqlite(rusqlite::Error),
    /// Tags may only contain ASCII letters, digits, `-` and `_`
    InvalidTag(String),
    /// The snapshot failed its integrity check
    Corrupt { path: PathBuf, message: String },
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io { path, source } => {
                write!(f, "Snapshot I/O error on '{}': {}", path.display(), source)
            }
            SnapshotError::Sqlite(e) => write!(f, "Snapshot failed: {}", e),
            SnapshotError::InvalidTag(tag) => write!(f, "Invalid snapshot tag '{}'", tag),
            SnapshotError::Corrupt { path, message } => {
                write!(f, "Snapshot '{}' is corrupt: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Sqlite(e) => Some(e),
            SnapshotError::InvalidTag(_) | SnapshotError::Corrupt { .. } => None,
        }
    }
}
