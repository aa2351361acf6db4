//! Read-only store inspection
//!
//! Reports what is on disk without running the initialization sequence:
//! nothing is created, tuned or migrated here.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::config::{format_size, StoreConfig};
use crate::database::migration::{catalog, LedgerEntry, Migration, MigrationLedger};
use crate::database::snapshot::{SnapshotGuard, SnapshotRef};

/// Snapshot of the store's on-disk state
#[derive(Debug, Serialize, Clone)]
pub struct StoreStatus {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Whether the ledger table exists
    pub ledger_initialized: bool,
    /// Store exists and no migration is pending
    pub up_to_date: bool,
    pub applied: Vec<LedgerEntry>,
    pub pending: Vec<String>,
    pub snapshots: Vec<SnapshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Inspect the configured store against the built-in catalog
pub fn store_status(config: &StoreConfig) -> StoreStatus {
    let guard = config.snapshots_enabled.then(|| {
        SnapshotGuard::new(
            config.snapshot_dir(),
            config.database_stem(),
            config.snapshot_keep,
        )
    });
    inspect_store(
        Path::new(&config.sqlite_path()),
        catalog::MIGRATIONS,
        guard.as_ref(),
    )
}

/// Inspect the store at `path` against `catalog`
pub fn inspect_store(
    path: &Path,
    catalog: &[Migration],
    snapshots: Option<&SnapshotGuard>,
) -> StoreStatus {
    let exists = path.exists();
    let size_bytes = if exists {
        std::fs::metadata(path).ok().map(|m| m.len())
    } else {
        None
    };

    let mut status = StoreStatus {
        path: path.to_string_lossy().to_string(),
        exists,
        size_bytes,
        size: size_bytes.map(format_size),
        ledger_initialized: false,
        up_to_date: false,
        applied: Vec::new(),
        // a missing store has everything pending
        pending: catalog.iter().map(|m| m.name.to_string()).collect(),
        snapshots: Vec::new(),
        error: None,
    };

    if let Some(guard) = snapshots {
        match guard.list() {
            Ok(list) => status.snapshots = list,
            Err(e) => status.error = Some(e.to_string()),
        }
    }

    if !exists {
        return status;
    }

    let conn = match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => conn,
        Err(e) => {
            status.error = Some(format!("Failed to open store: {}", e));
            return status;
        }
    };

    let ledger = MigrationLedger::new(&conn);
    let result = ledger.exists().and_then(|present| {
        if !present {
            return Ok(false);
        }
        status.applied = ledger.entries()?;
        status.pending = ledger
            .pending(catalog)?
            .iter()
            .map(|m| m.name.to_string())
            .collect();
        Ok(true)
    });

    match result {
        Ok(initialized) => {
            status.ledger_initialized = initialized;
            status.up_to_date = initialized && status.pending.is_empty();
        }
        Err(e) => status.error = Some(e.to_string()),
    }

    status
}
