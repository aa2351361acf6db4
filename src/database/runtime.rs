//! Store initialization runtime
//!
//! [`StoreRuntime`] is the one object the application builds at startup. It
//! owns the connection manager, the migration runner and the snapshot guard,
//! and drives them through a small state machine:
//!
//! ```text
//! Uninitialized --initialize()--> Initializing --ok--> Ready
//!                                              \--err--> Failed(error)
//! ```
//!
//! Callers that arrive while initialization is in flight await the same
//! shared future, so the open -> tune -> ledger -> snapshot -> migrate
//! sequence runs at most once. A failure is cached and returned to every
//! later caller until [`StoreRuntime::reset`] is called.
//!
//! The state only keeps a weak reference to the in-flight future. If every
//! caller drops its `initialize()` future before it completes, the sequence
//! is abandoned and the next call starts a new one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::database::core::{ConnectionManager, StoreHandle, StoreLocation, Tuning};
use crate::database::error::StoreError;
use crate::database::migration::{
    catalog, validate_catalog, Migration, MigrationLedger, MigrationRunner, RunOutcome,
};
use crate::database::snapshot::{SnapshotGuard, PRE_MIGRATION_TAG};

type SequenceFuture = BoxFuture<'static, Result<StoreHandle, StoreError>>;
type InitFuture = Shared<SequenceFuture>;

enum InitState {
    Uninitialized,
    Initializing(WeakShared<SequenceFuture>),
    Ready(StoreHandle),
    Failed(StoreError),
}

/// Externally visible initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl std::fmt::Display for InitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitStatus::Uninitialized => write!(f, "uninitialized"),
            InitStatus::Initializing => write!(f, "initializing"),
            InitStatus::Ready => write!(f, "ready"),
            InitStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Process-wide store context
pub struct StoreRuntime {
    connections: ConnectionManager,
    runner: MigrationRunner,
    snapshots: Option<SnapshotGuard>,
    catalog: &'static [Migration],
    state: Mutex<InitState>,
    sequence_runs: AtomicUsize,
}

impl StoreRuntime {
    /// Create a runtime for `location` that will apply `catalog`
    ///
    /// No snapshots are taken unless [`with_snapshots`](Self::with_snapshots)
    /// is used.
    pub fn new(location: StoreLocation, tuning: Tuning, catalog: &'static [Migration]) -> Self {
        Self {
            connections: ConnectionManager::new(location, tuning),
            runner: MigrationRunner::new(),
            snapshots: None,
            catalog,
            state: Mutex::new(InitState::Uninitialized),
            sequence_runs: AtomicUsize::new(0),
        }
    }

    /// Take a best-effort snapshot through `guard` before migrating
    pub fn with_snapshots(mut self, guard: SnapshotGuard) -> Self {
        self.snapshots = Some(guard);
        self
    }

    /// Build the runtime for the configured store with the built-in catalog
    pub fn from_config(config: &StoreConfig) -> Self {
        let runtime = Self::new(
            StoreLocation::file(config.sqlite_path()),
            Tuning {
                busy_timeout: config.busy_timeout(),
            },
            catalog::MIGRATIONS,
        );

        if config.snapshots_enabled {
            runtime.with_snapshots(SnapshotGuard::new(
                config.snapshot_dir(),
                config.database_stem(),
                config.snapshot_keep,
            ))
        } else {
            runtime
        }
    }

    /// Bring the store to the ready state
    ///
    /// - `Ready`: returns immediately
    /// - `Failed`: returns the cached error without retrying
    /// - `Initializing`: awaits the in-flight sequence
    /// - `Uninitialized`: starts the sequence
    pub async fn initialize(self: &Arc<Self>) -> Result<(), StoreError> {
        let in_flight = {
            let mut state = self.lock_state();
            let running = match &*state {
                InitState::Ready(_) => return Ok(()),
                InitState::Failed(err) => return Err(err.clone()),
                InitState::Initializing(weak) => weak.upgrade(),
                InitState::Uninitialized => None,
            };
            match running {
                Some(fut) => fut,
                None => {
                    let fut = self.start_sequence();
                    if let Some(weak) = fut.downgrade() {
                        *state = InitState::Initializing(weak);
                    }
                    fut
                }
            }
        };

        in_flight.await.map(|_| ())
    }

    /// The store connection, only once the runtime is ready
    ///
    /// This is the sanctioned way for the rest of the application to reach
    /// the database.
    pub fn safe_handle(&self) -> Result<StoreHandle, StoreError> {
        match &*self.lock_state() {
            InitState::Ready(handle) => Ok(handle.clone()),
            _ => Err(StoreError::NotInitialized),
        }
    }

    /// Run `f` against the connection, only once the runtime is ready
    pub async fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> R,
    ) -> Result<R, StoreError> {
        let handle = self.safe_handle()?;
        let conn = handle.lock().await;
        Ok(f(&conn))
    }

    /// Clear a cached failure so the next `initialize()` starts over
    ///
    /// Meant for development and for an explicit user-triggered retry.
    /// Returns whether the state was `Failed`.
    pub fn reset(&self) -> bool {
        let mut state = self.lock_state();
        if matches!(*state, InitState::Failed(_)) {
            info!("Resetting failed store initialization");
            *state = InitState::Uninitialized;
            true
        } else {
            false
        }
    }

    pub fn status(&self) -> InitStatus {
        match &*self.lock_state() {
            InitState::Uninitialized => InitStatus::Uninitialized,
            // every caller went away before the sequence finished
            InitState::Initializing(weak) if weak.upgrade().is_none() => {
                InitStatus::Uninitialized
            }
            InitState::Initializing(_) => InitStatus::Initializing,
            InitState::Ready(_) => InitStatus::Ready,
            InitState::Failed(_) => InitStatus::Failed,
        }
    }

    /// The cached initialization error, if any
    pub fn failure(&self) -> Option<StoreError> {
        match &*self.lock_state() {
            InitState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// How many times the initialization sequence actually started
    pub fn sequence_runs(&self) -> usize {
        self.sequence_runs.load(Ordering::SeqCst)
    }

    /// Number of times the store was opened
    pub fn open_count(&self) -> usize {
        self.connections.open_count()
    }

    /// Number of times the connection tuning was applied
    pub fn tuning_count(&self) -> usize {
        self.connections.tuning_count()
    }

    pub fn catalog(&self) -> &'static [Migration] {
        self.catalog
    }

    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        // The state is plain data; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_sequence(self: &Arc<Self>) -> InitFuture {
        let runtime = Arc::clone(self);
        async move { runtime.run_sequence().await }.boxed().shared()
    }

    /// The initialization sequence plus its terminal state transition
    async fn run_sequence(self: Arc<Self>) -> Result<StoreHandle, StoreError> {
        self.sequence_runs.fetch_add(1, Ordering::SeqCst);
        info!(
            "Initializing local store at {}",
            self.connections.location()
        );

        let result = self.prepare_store().await;

        let mut state = self.lock_state();
        match &result {
            Ok(handle) => {
                *state = InitState::Ready(handle.clone());
                info!("Local store ready");
            }
            Err(err) => {
                *state = InitState::Failed(err.clone());
                error!("Local store initialization failed: {}", err);
            }
        }
        result
    }

    async fn prepare_store(&self) -> Result<StoreHandle, StoreError> {
        validate_catalog(self.catalog)?;

        let handle = self.connections.connection().await?;
        let mut conn = handle.lock().await;

        let ledger = MigrationLedger::new(&conn);
        ledger.ensure()?;
        let pending = ledger.pending(self.catalog)?;

        if !pending.is_empty() {
            info!("{} migration(s) pending", pending.len());
            self.snapshot_before_migrating(&conn);
        }

        match self.runner.run_all(&mut conn, self.catalog)? {
            RunOutcome::UpToDate => debug!("Schema is current"),
            RunOutcome::Applied { names } => {
                info!("Applied migrations: {}", names.join(", "))
            }
            RunOutcome::AlreadyRunning => return Err(StoreError::MigrationsInProgress),
        }

        drop(conn);
        Ok(handle)
    }

    /// Best-effort snapshot and rotation; failures are logged and dropped
    fn snapshot_before_migrating(&self, conn: &Connection) {
        let Some(guard) = &self.snapshots else {
            debug!("Snapshots disabled, migrating without backup");
            return;
        };

        match guard.create_snapshot(conn, PRE_MIGRATION_TAG) {
            Ok(_) => {
                if let Err(e) = guard.rotate(guard.keep()) {
                    warn!("Failed to rotate snapshots: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to create pre-migration snapshot, migrating anyway: {}", e);
            }
        }
    }
}
