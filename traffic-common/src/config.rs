//! Bootstrap configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! Tiers 1 and 2 are handled by each binary's `clap` arguments (`env = ...`),
//! which leave a field `None` when neither is given. This module supplies
//! tiers 3 and 4. A missing TOML file is normal; a malformed one is reported
//! to the caller, which logs it and carries on with defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directory name used under the platform config and data directories
pub const APP_DIR_NAME: &str = "smart-traffic";

/// Default database file name inside the data directory
pub const DATABASE_FILE_NAME: &str = "smart_traffic.db";

/// Bootstrap configuration loaded from `<module>.toml`
///
/// Every field is optional: absent values fall through to compiled defaults.
/// Each service reads only the keys it understands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// HTTP listen port
    pub port: Option<u16>,

    /// SQLite database file
    pub database_path: Option<PathBuf>,

    /// Keep events in process memory instead of SQLite
    pub in_memory: Option<bool>,

    /// Maximum records held by the in-memory store
    pub memory_capacity: Option<usize>,

    /// Base URL of the classification service
    pub classifier_url: Option<String>,

    /// Client-side timeout for one classification call
    pub classifier_timeout_ms: Option<u64>,

    /// How long shutdown waits for in-flight enrichment tasks
    pub shutdown_grace_ms: Option<u64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Pick the first configured value, falling back to the compiled default
pub fn resolve<T>(cli_or_env: Option<T>, toml: Option<T>, default: T) -> T {
    cli_or_env.or(toml).unwrap_or(default)
}

/// Candidate locations for a module's TOML file, in lookup order
pub fn config_file_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR_NAME).join(&file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc").join(APP_DIR_NAME).join(&file_name));
    }

    candidates
}

/// Load the first TOML config file found for `module_name`
///
/// Returns `Ok(None)` when no file exists.
pub fn load_toml_config(module_name: &str) -> Result<Option<(PathBuf, TomlConfig)>> {
    for path in config_file_candidates(module_name) {
        if path.exists() {
            let config = load_toml_config_from(&path)?;
            return Ok(Some((path, config)));
        }
    }
    Ok(None)
}

/// Parse a specific TOML config file
pub fn load_toml_config_from(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// OS-dependent data directory for smart-traffic
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./smart_traffic_data"))
}

/// Default SQLite database path
pub fn default_database_path() -> PathBuf {
    default_data_dir().join(DATABASE_FILE_NAME)
}
