//! Database module
//!
//! Everything needed to bring the local phrasebook store from "file on disk"
//! to "safe to query":
//!
//! - **core**: connection management, connection tuning and SQL statement
//!   normalization
//! - **migration**: the migration catalog, the `schema_migrations` ledger and
//!   the runner that applies pending migrations
//! - **snapshot**: best-effort pre-migration backups with rotation
//! - **runtime**: the single-flight initialization state machine
//! - **status**: read-only inspection of the store on disk
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # lazily opened, tuned, shared connection
//! │   └── normalize   # statement cleanup before execution
//! │
//! ├── migration/      # Schema evolution
//! │   ├── catalog     # ordered list of migrations
//! │   ├── ledger      # schema_migrations table
//! │   └── runner      # one transaction per migration
//! │
//! ├── snapshot        # VACUUM INTO backups
//! ├── runtime         # StoreRuntime: initialize() / safe_handle()
//! └── status          # StoreStatus for reporting
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use phrasebook::database::StoreRuntime;
//! use phrasebook::StoreConfig;
//!
//! let config = StoreConfig::new(&None)?;
//! let runtime = Arc::new(StoreRuntime::from_config(&config));
//!
//! runtime.initialize().await?;
//!
//! let handle = runtime.safe_handle()?;
//! let conn = handle.lock().await;
//! let count: i64 = conn.query_row("SELECT COUNT(*) FROM phrases", [], |r| r.get(0))?;
//! ```

pub mod core;
pub mod error;
pub mod migration;
pub mod runtime;
pub mod snapshot;
pub mod status;

// =============================================================================
// Connection
// =============================================================================

pub use core::{
    normalize_statement, normalized_statements, open_raw, ConnectionManager, StoreHandle,
    StoreLocation, Tuning, DEFAULT_BUSY_TIMEOUT,
};

// =============================================================================
// Migrations
// =============================================================================

pub use migration::{
    validate_catalog, LedgerEntry, Migration, MigrationLedger, MigrationRunner, RunOutcome,
    LEDGER_TABLE,
};

// =============================================================================
// Snapshots, runtime and status
// =============================================================================

pub use snapshot::{
    restore_snapshot, SnapshotError, SnapshotGuard, SnapshotRef, DEFAULT_SNAPSHOT_KEEP,
    PRE_MIGRATION_TAG,
};

pub use runtime::{InitStatus, StoreRuntime};

pub use status::{inspect_store, store_status, StoreStatus};

pub use error::StoreError;
