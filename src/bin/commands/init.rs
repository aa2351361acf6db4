use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use phrasebook::database::store_status;
use phrasebook::{InitStatus, OutputFormat, StoreConfig, StoreRuntime};
use serde::Serialize;

/// Arguments for the Init command
#[derive(Args)]
pub struct InitArgs {
    /// Do not snapshot the store before applying migrations
    #[clap(long)]
    pub no_snapshot: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    path: String,
    status: InitStatus,
    applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<String>,
}

pub async fn run(config: &StoreConfig, args: InitArgs, output_format: OutputFormat) -> Result<()> {
    let mut config = config.clone();
    if args.no_snapshot {
        config.snapshots_enabled = false;
    }

    let before = store_status(&config);

    let runtime = Arc::new(StoreRuntime::from_config(&config));
    runtime
        .initialize()
        .await
        .map_err(|e| anyhow!("Failed to initialize store at {}: {}", before.path, e))?;

    let after = store_status(&config);

    let applied: Vec<String> = before
        .pending
        .iter()
        .filter(|name| !after.pending.contains(name))
        .cloned()
        .collect();

    let snapshot = after
        .snapshots
        .iter()
        .find(|s| !before.snapshots.iter().any(|old| old.path == s.path))
        .map(|s| s.path.to_string_lossy().to_string());

    let report = InitReport {
        path: after.path,
        status: runtime.status(),
        applied,
        snapshot,
    };

    if output_format.is_json() {
        println!("{}", output_format.to_json(&report)?);
        return Ok(());
    }

    println!("Store:      {}", report.path);
    println!("Status:     {}", report.status);
    if report.applied.is_empty() {
        println!("Migrations: up to date");
    } else {
        println!("Migrations: applied {}", report.applied.len());
        for name in &report.applied {
            println!("  {}", name);
        }
    }
    if let Some(snapshot) = &report.snapshot {
        println!("Snapshot:   {}", snapshot);
    }

    Ok(())
}
