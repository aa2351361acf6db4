use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::database::DEFAULT_SNAPSHOT_KEEP;

const DEFAULT_DATABASE_FILE: &str = "phrasebook.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the store file and its snapshots
    pub data_dir: String,

    /// File name of the store inside `data_dir`
    pub database_file: String,

    /// How long a writer waits on a locked store, in milliseconds
    pub busy_timeout_ms: u64,

    /// Snapshots kept after rotation
    pub snapshot_keep: usize,

    /// Take a snapshot before applying migrations
    pub snapshots_enabled: bool,
}

const EMPTY_CONFIG: &str = r#"### phrasebook configuration file

### directory holding the local store and its snapshots
# data_dir = "~/.phrasebook"

### store file name inside data_dir
# database_file = "phrasebook.sqlite3"

### milliseconds a writer waits on a locked store
# busy_timeout_ms = 5000

### pre-migration snapshots
# snapshots_enabled = true
# snapshot_keep = 3
"#;

fn home_dir_string() -> String {
    dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> String {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{}", home_dir_string(), rest)
        }
        _ => path.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: format!("{}/.phrasebook", home_dir_string()),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            snapshot_keep: DEFAULT_SNAPSHOT_KEEP,
            snapshots_enabled: true,
        }
    }
}

impl StoreConfig {
    /// Load the configuration from `path` (or the default location) and the
    /// `PHRASEBOOK_*` environment
    pub fn new(path: &Option<String>) -> Result<StoreConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let dir = format!("{}/.phrasebook", home_dir_string());
                std::fs::create_dir_all(dir.as_str())
                    .map_err(|e| anyhow!("Unable to create phrasebook directory: {}", e))?;
                let p = Self::config_file_path();
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g. `PHRASEBOOK_DATA_DIR=/tmp/pb phrasebook init`
        builder = builder.add_source(config::Environment::with_prefix("PHRASEBOOK"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let values = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_values(&values)
    }

    fn from_values(values: &HashMap<String, String>) -> Result<StoreConfig> {
        let defaults = StoreConfig::default();

        let data_dir = values
            .get("data_dir")
            .map(|p| expand_home(p.trim()))
            .unwrap_or(defaults.data_dir);

        let database_file = match values.get("database_file") {
            Some(name) if name.contains('/') || name.trim().is_empty() => {
                return Err(anyhow!("Invalid database_file '{}'", name));
            }
            Some(name) => name.trim().to_string(),
            None => defaults.database_file,
        };

        let busy_timeout_ms = values
            .get("busy_timeout_ms")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.busy_timeout_ms);

        let snapshot_keep = values
            .get("snapshot_keep")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.snapshot_keep);

        let snapshots_enabled = values
            .get("snapshots_enabled")
            .and_then(|s| parse_bool(s))
            .unwrap_or(defaults.snapshots_enabled);

        Ok(StoreConfig {
            data_dir,
            database_file,
            busy_timeout_ms,
            snapshot_keep,
            snapshots_enabled,
        })
    }

    /// Path to the SQLite store file
    pub fn sqlite_path(&self) -> String {
        format!(
            "{}/{}",
            self.data_dir.trim_end_matches('/'),
            self.database_file
        )
    }

    /// Root of the snapshot directories, one subdirectory per store
    pub fn snapshot_dir(&self) -> String {
        format!("{}/snapshots", self.data_dir.trim_end_matches('/'))
    }

    /// Store file name without its extension, used to name snapshots
    pub fn database_stem(&self) -> String {
        Path::new(&self.database_file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "phrasebook".to_string())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Data Directory:     {}", self.data_dir),
            format!("SQLite Path:        {}", self.sqlite_path()),
            format!("Busy Timeout:       {} ms", self.busy_timeout_ms),
        ];

        if self.snapshots_enabled {
            lines.push(format!(
                "Snapshots:          {} (keep {})",
                self.snapshot_dir(),
                self.snapshot_keep
            ));
        } else {
            lines.push("Snapshots:          disabled".to_string());
        }

        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        format!("{}/.phrasebook/phrasebook.toml", home_dir_string())
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.data_dir.ends_with("/.phrasebook"));
        assert_eq!(config.database_file, "phrasebook.sqlite3");
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.snapshot_keep, 3);
        assert!(config.snapshots_enabled);
    }

    #[test]
    fn test_paths() {
        let config = StoreConfig {
            data_dir: "/test/dir/".to_string(),
            ..StoreConfig::default()
        };

        assert_eq!(config.sqlite_path(), "/test/dir/phrasebook.sqlite3");
        assert_eq!(config.snapshot_dir(), "/test/dir/snapshots");
        assert_eq!(config.database_stem(), "phrasebook");
        assert_eq!(config.busy_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_from_values() {
        let config = StoreConfig::from_values(&values(&[
            ("data_dir", "/srv/pb"),
            ("database_file", "lyrics.db"),
            ("busy_timeout_ms", "250"),
            ("snapshot_keep", "7"),
            ("snapshots_enabled", "false"),
        ]))
        .unwrap();

        assert_eq!(config.sqlite_path(), "/srv/pb/lyrics.db");
        assert_eq!(config.database_stem(), "lyrics");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.snapshot_keep, 7);
        assert!(!config.snapshots_enabled);
        assert!(config.summary().contains("disabled"));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = StoreConfig::from_values(&values(&[
            ("busy_timeout_ms", "soon"),
            ("snapshot_keep", "-1"),
            ("snapshots_enabled", "maybe"),
        ]))
        .unwrap();
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.snapshot_keep, 3);
        assert!(config.snapshots_enabled);
    }

    #[test]
    fn test_database_file_must_be_a_name() {
        assert!(StoreConfig::from_values(&values(&[("database_file", "a/b.db")])).is_err());
        assert!(StoreConfig::from_values(&values(&[("database_file", " ")])).is_err());
    }

    #[test]
    fn test_expand_home() {
        let home = home_dir_string();
        assert_eq!(expand_home("~/pb"), format!("{}/pb", home));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/abs/~x"), "/abs/~x");
        assert_eq!(expand_home("~other/pb"), "~other/pb");
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("phrasebook.toml");
        let path_str = path.to_string_lossy().to_string();

        // a missing file is created from the template
        StoreConfig::new(&Some(path_str.clone())).unwrap();
        let template = std::fs::read_to_string(&path).unwrap();
        assert!(template.contains("# data_dir"));

        std::fs::write(
            &path,
            "data_dir = \"/var/lib/pb\"\nsnapshot_keep = 5\nsnapshots_enabled = false\n",
        )
        .unwrap();
        let config = StoreConfig::new(&Some(path_str)).unwrap();
        assert_eq!(config.data_dir, "/var/lib/pb");
        assert_eq!(config.snapshot_keep, 5);
        assert!(!config.snapshots_enabled);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }
}
