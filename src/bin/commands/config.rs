use anyhow::Result;
use phrasebook::{OutputFormat, StoreConfig};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    data_dir: String,
    sqlite_path: String,
    busy_timeout_ms: u64,
    snapshots: SnapshotSettings,
}

#[derive(Debug, Serialize)]
struct SnapshotSettings {
    enabled: bool,
    directory: String,
    keep: usize,
}

pub fn run(config: &StoreConfig, config_path: Option<&str>, output_format: OutputFormat) -> Result<()> {
    let config_info = ConfigInfo {
        config_file: config_path
            .map(str::to_string)
            .unwrap_or_else(StoreConfig::config_file_path),
        data_dir: config.data_dir.clone(),
        sqlite_path: config.sqlite_path(),
        busy_timeout_ms: config.busy_timeout_ms,
        snapshots: SnapshotSettings {
            enabled: config.snapshots_enabled,
            directory: config.snapshot_dir(),
            keep: config.snapshot_keep,
        },
    };

    if output_format.is_json() {
        println!("{}", output_format.to_json(&config_info)?);
        return Ok(());
    }

    println!("Phrasebook Configuration");
    println!("========================\n");
    println!("Config File:        {}", config_info.config_file);
    println!("{}", config.summary());

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Set PHRASEBOOK_DATA_DIR to point at another store");
    Ok(())
}
