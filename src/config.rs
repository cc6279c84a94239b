//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; a missing file section
//! falls back to the defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the default account info path.
pub const ACCOUNT_INFO_ENV_VAR: &str = "B2_ACCOUNT_INFO";

/// Default file name under the home directory.
const DEFAULT_ACCOUNT_INFO_FILE: &str = "~/.b2_account_info";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Account info store settings.
    #[serde(default)]
    pub account_info: AccountInfoConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which account info backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local, nothing persisted.
    Memory,
    /// JSON document with file locking.
    Local,
    /// SQLite database.
    #[default]
    Sqlite,
}

/// Account info store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountInfoConfig {
    /// Backend type: `memory`, `local` or `sqlite`.
    #[serde(default)]
    pub backend: BackendKind,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,

    /// Local JSON file configuration.
    #[serde(default)]
    pub local: LocalConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file. A leading `~/` is expanded.
    #[serde(default = "default_sqlite_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
        }
    }
}

/// Local JSON file configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Path to the JSON document. A leading `~/` is expanded.
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_sqlite_path() -> String {
    account_info_path(std::env::var(ACCOUNT_INFO_ENV_VAR).ok(), "")
}

fn default_local_path() -> String {
    account_info_path(std::env::var(ACCOUNT_INFO_ENV_VAR).ok(), ".json")
}

/// The environment override if set, else the home-directory default with `suffix`.
fn account_info_path(env_override: Option<String>, suffix: &str) -> String {
    match env_override {
        Some(path) if !path.is_empty() => path,
        _ => format!("{DEFAULT_ACCOUNT_INFO_FILE}{suffix}"),
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Paths -------------------------------------------------------------------

/// Expand a leading `~/` to the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
