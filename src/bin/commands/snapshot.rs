use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use phrasebook::database::{open_raw, restore_snapshot, SnapshotGuard, SnapshotRef};
use phrasebook::{format_size, OutputFormat, StoreConfig, StoreLocation};
use serde::Serialize;
use tabled::Tabled;

use super::{format_time, print_rows};

/// Arguments for the Snapshot command
#[derive(Args)]
pub struct SnapshotArgs {
    #[clap(subcommand)]
    pub command: Option<SnapshotCommands>,
}

/// Snapshot subcommands
#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Snapshot the store now
    Create {
        /// Label stored in the snapshot file name
        #[clap(long, short, default_value = "manual")]
        tag: String,
    },

    /// List snapshots, newest first (default when no subcommand)
    List,

    /// Delete all but the newest snapshots
    Prune {
        /// How many snapshots to keep, defaults to the configured snapshot_keep
        #[clap(long, short)]
        keep: Option<usize>,
    },

    /// Copy a snapshot over the store file
    Restore {
        /// Snapshot file to restore
        #[clap(value_name = "PATH")]
        path: PathBuf,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct SnapshotRow {
    created_at: String,
    tag: String,
    size: String,
    path: String,
}

impl From<&SnapshotRef> for SnapshotRow {
    fn from(snapshot: &SnapshotRef) -> Self {
        let size = std::fs::metadata(&snapshot.path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "-".to_string());
        SnapshotRow {
            created_at: format_time(&snapshot.created_at),
            tag: snapshot.tag.clone(),
            size,
            path: snapshot.path.to_string_lossy().to_string(),
        }
    }
}

fn guard(config: &StoreConfig) -> SnapshotGuard {
    SnapshotGuard::new(
        config.snapshot_dir(),
        config.database_stem(),
        config.snapshot_keep,
    )
}

pub fn run(config: &StoreConfig, args: SnapshotArgs, output_format: OutputFormat) -> Result<()> {
    match args.command {
        Some(SnapshotCommands::Create { tag }) => run_create(config, &tag, output_format),
        None | Some(SnapshotCommands::List) => run_list(config, output_format),
        Some(SnapshotCommands::Prune { keep }) => run_prune(config, keep, output_format),
        Some(SnapshotCommands::Restore { path, yes }) => run_restore(config, &path, yes),
    }
}

fn run_create(config: &StoreConfig, tag: &str, output_format: OutputFormat) -> Result<()> {
    let sqlite_path = config.sqlite_path();
    if !Path::new(&sqlite_path).exists() {
        return Err(anyhow!(
            "Store {} does not exist, run `phrasebook init` first",
            sqlite_path
        ));
    }

    let conn = open_raw(&StoreLocation::file(&sqlite_path))?;
    let snapshot = guard(config).create_snapshot(&conn, tag)?;

    if output_format.is_json() {
        println!("{}", output_format.to_json(&snapshot)?);
    } else {
        println!("Created snapshot {}", snapshot.path.display());
    }
    Ok(())
}

fn run_list(config: &StoreConfig, output_format: OutputFormat) -> Result<()> {
    let guard = guard(config);
    let rows: Vec<SnapshotRow> = guard.list()?.iter().map(SnapshotRow::from).collect();

    if rows.is_empty() && !output_format.is_json() {
        println!("No snapshots in {}", guard.dir().display());
        return Ok(());
    }

    print_rows(&rows, output_format)
}

fn run_prune(config: &StoreConfig, keep: Option<usize>, output_format: OutputFormat) -> Result<()> {
    let keep = keep.unwrap_or(config.snapshot_keep);
    let removed = guard(config).rotate(keep)?;

    if output_format.is_json() {
        println!("{}", output_format.to_json(&removed)?);
        return Ok(());
    }

    if removed.is_empty() {
        println!("Nothing to prune (keeping {})", keep);
    } else {
        println!("Removed {} snapshot(s):", removed.len());
        for path in &removed {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn run_restore(config: &StoreConfig, snapshot: &Path, yes: bool) -> Result<()> {
    let sqlite_path = config.sqlite_path();

    if !yes {
        eprintln!(
            "This will overwrite {} with {}.",
            sqlite_path,
            snapshot.display()
        );
        eprintln!("Re-run with --yes to confirm.");
        return Ok(());
    }

    restore_snapshot(snapshot, Path::new(&sqlite_path))?;
    println!("Restored {} from {}", sqlite_path, snapshot.display());
    Ok(())
}
