#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Phrasebook - local store runtime
//!
//! Phrasebook owns the on-device SQLite store of the phrasebook app. It opens
//! and tunes the connection, brings the schema up to date by applying ordered
//! migrations exactly once, snapshots the store before migrating, and only
//! hands out a connection once all of that has succeeded.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Store runtime, migrations, snapshots, status | `rusqlite`, `tokio`, `futures` |
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `phrasebook` binary | All above + `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only
//! phrasebook = { version = "0.1", default-features = false }
//!
//! # Default (CLI binary)
//! phrasebook = "0.1"
//! ```
//!
//! # Architecture
//!
//! - **[`database`]**: connection management, migrations, snapshots and the
//!   initialization runtime
//! - **[`config`]**: configuration loading (`~/.phrasebook/phrasebook.toml`
//!   plus `PHRASEBOOK_*` environment variables)
//! - **[`output`]**: output formats shared by the CLI commands
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use phrasebook::{StoreConfig, StoreRuntime};
//!
//! let config = StoreConfig::new(&None)?;
//! let runtime = Arc::new(StoreRuntime::from_config(&config));
//!
//! // Concurrent callers share one initialization
//! runtime.initialize().await?;
//!
//! // Everything else goes through the safe handle
//! let rows = runtime
//!     .with_connection(|conn| {
//!         conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get::<_, i64>(0))
//!     })
//!     .await??;
//! ```

pub mod config;
pub mod database;
pub mod output;

// =============================================================================
// Configuration
// =============================================================================

pub use config::{format_size, StoreConfig};

// =============================================================================
// Store runtime
// =============================================================================

pub use database::{
    InitStatus, Migration, RunOutcome, StoreError, StoreHandle, StoreLocation, StoreRuntime,
    StoreStatus,
};

pub use output::OutputFormat;
