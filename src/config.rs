use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

const CONFIG_FILE: &str = "config.json";

/// Output format for listings
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Command-line tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub output_format: OutputFormat,
    /// `tracing` filter level used when no `-v` flag is given
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Append every add/remove/enable/disable to the audit log
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            log_level: default_log_level(),
            audit_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

/// Saves the config into `dir` using an atomic write pattern.
/// 1. Writes to a temporary file in the same directory.
/// 2. Flushes it to disk.
/// 3. Atomically renames it over the target path.
///
/// Files inherit the directory ACLs: `%APPDATA%\winfw\winfw\config`
pub fn save_config_to(config: &AppConfig, dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(config)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.as_file().sync_all()?;

    file.persist(dir.join(CONFIG_FILE)).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e.error
        }
    })?;
    Ok(())
}

/// Saves the config to the platform config directory
pub fn save_config(config: &AppConfig) -> std::io::Result<()> {
    match get_config_dir() {
        Some(dir) => save_config_to(config, &dir),
        None => Ok(()),
    }
}

/// Loads the config from `dir`, or returns default if missing or unreadable.
pub fn load_config_from(dir: &Path) -> AppConfig {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid config {}: {e}", path.display());
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

/// Loads the config from the platform config directory
pub fn load_config() -> AppConfig {
    get_config_dir()
        .map(|dir| load_config_from(&dir))
        .unwrap_or_default()
}
