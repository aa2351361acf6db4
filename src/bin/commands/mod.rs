pub mod config;
pub mod init;
pub mod snapshot;
pub mod status;

use anyhow::Result;
use chrono::{DateTime, Utc};
use phrasebook::OutputFormat;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Print a list of rows as a table or as a JSON array
pub(crate) fn print_rows<T>(rows: &[T], output_format: OutputFormat) -> Result<()>
where
    T: Tabled + Serialize,
{
    if output_format.is_json() {
        println!("{}", output_format.to_json(&rows)?);
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

pub(crate) fn format_time(datetime: &DateTime<Utc>) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format a ledger timestamp (epoch milliseconds)
pub(crate) fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| format_time(&dt))
        .unwrap_or_else(|| millis.to_string())
}
