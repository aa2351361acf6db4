//! Output formatting for command results
//!
//! Every command prints a human-readable rendering by default and the same
//! data as JSON when asked.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a command prints its result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tables and aligned text
    #[default]
    Table,
    /// Compact JSON on one line
    Json,
    /// Indented JSON
    JsonPretty,
}

impl OutputFormat {
    /// Accepted format names, as printed by `Display`
    pub const NAMES: &'static [&'static str] = &["table", "json", "json-pretty"];

    pub fn is_json(&self) -> bool {
        !matches!(self, Self::Table)
    }

    /// Serialize `value` as JSON, indented for `JsonPretty`
    pub fn to_json<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            Self::JsonPretty => serde_json::to_string_pretty(value),
            Self::Table | Self::Json => serde_json::to_string(value),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "json-pretty" | "pretty" => Ok(Self::JsonPretty),
            other => Err(format!(
                "Unknown output format '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}
