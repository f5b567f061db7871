//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "KNIMIN_ROOT_FOLDER";

/// Database file name used when `database_path` is not configured
pub const DEFAULT_DATABASE_FILE: &str = "knimin.db";

/// Number of record ids sent per survey export request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional so a missing file behaves like an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Path to SQLite database file; relative paths resolve against the root folder
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub redcap: RedcapConfig,

    #[serde(default)]
    pub geocoder: GeocoderConfig,

    #[serde(default)]
    pub pulldown: PulldownConfig,
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

/// Survey export service (REDCap) connection settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedcapConfig {
    /// API endpoint, e.g. `https://redcap.example.org/api/`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Geocoding service settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override for the Google Maps API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Pulldown tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PulldownConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PulldownConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        if config.pulldown.batch_size == 0 {
            return Err(Error::Config(
                "pulldown.batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from the platform config file, or defaults if none exists
    pub fn load_default() -> Result<Self> {
        match load_config_file() {
            Ok(path) => Self::load(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Resolve database file location against the root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join(DEFAULT_DATABASE_FILE),
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Get default configuration file path for the platform
fn load_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("knimin").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/knimin/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("knimin"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\knimin"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("knimin"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/knimin"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("knimin"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/knimin"))
    }
}
