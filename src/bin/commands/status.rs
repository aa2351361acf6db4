use anyhow::Result;
use phrasebook::database::store_status;
use phrasebook::{OutputFormat, StoreConfig};
use serde::Serialize;
use tabled::Tabled;

use super::{format_millis, print_rows};

#[derive(Debug, Serialize, Tabled)]
struct MigrationRow {
    name: String,
    state: String,
    applied_at: String,
}

pub fn run(config: &StoreConfig, output_format: OutputFormat) -> Result<()> {
    let status = store_status(config);

    if output_format.is_json() {
        println!("{}", output_format.to_json(&status)?);
        return Ok(());
    }

    let mut rows: Vec<MigrationRow> = status
        .applied
        .iter()
        .map(|entry| MigrationRow {
            name: entry.name.clone(),
            state: "applied".to_string(),
            applied_at: format_millis(entry.applied_at),
        })
        .collect();
    rows.extend(status.pending.iter().map(|name| MigrationRow {
        name: name.clone(),
        state: "pending".to_string(),
        applied_at: "-".to_string(),
    }));

    println!("Store:      {}", status.path);
    println!(
        "File:       {}",
        match (status.exists, &status.size) {
            (true, Some(size)) => format!("exists ({})", size),
            (true, None) => "exists".to_string(),
            (false, _) => "not created".to_string(),
        }
    );
    println!(
        "Schema:     {}",
        if status.up_to_date {
            "up to date".to_string()
        } else if status.ledger_initialized {
            format!("{} migration(s) pending", status.pending.len())
        } else {
            "not initialized".to_string()
        }
    );
    println!("Snapshots:  {}", status.snapshots.len());
    if let Some(error) = &status.error {
        println!("Error:      {}", error);
    }
    println!();

    print_rows(&rows, output_format)
}

pub fn run_pending(config: &StoreConfig, output_format: OutputFormat) -> Result<()> {
    let status = store_status(config);

    if output_format.is_json() {
        println!("{}", output_format.to_json(&status.pending)?);
        return Ok(());
    }

    if status.pending.is_empty() {
        println!("No pending migrations");
        return Ok(());
    }

    for name in &status.pending {
        println!("{}", name);
    }
    Ok(())
}
