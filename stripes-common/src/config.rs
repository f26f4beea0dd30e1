//! Bootstrap configuration and root folder resolution
//!
//! Configuration comes from a small TOML file. Everything has a built-in
//! default, so a missing file is a warning rather than a startup failure.
//!
//! # Root folder priority
//!
//! 1. Command-line argument
//! 2. `STRIPES_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent default under the platform data directory

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::AuthorizationPolicy;
use crate::levels::{Level, LevelOrder};
use crate::session::{SessionConfig, DEFAULT_DOCUMENT_PATH};
use crate::{Error, Result};

pub const ROOT_FOLDER_ENV: &str = "STRIPES_ROOT_FOLDER";
pub const DATABASE_FILE: &str = "stripes.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// stripes-ds listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL clients use to reach stripes-ds
    #[serde(default = "default_store_url")]
    pub store_url: String,

    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Idle window before a burst of edits is written
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Accounts with these emails are admins (case-insensitive)
    #[serde(default)]
    pub admin_emails: Vec<String>,

    /// Curriculum levels in progression order
    #[serde(default)]
    pub levels: Vec<LevelConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    pub id: String,
    pub name: String,
}

fn default_port() -> u16 {
    5780
}

fn default_store_url() -> String {
    "http://127.0.0.1:5780".to_string()
}

fn default_document_path() -> String {
    DEFAULT_DOCUMENT_PATH.to_string()
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            store_url: default_store_url(),
            document_path: default_document_path(),
            debounce_ms: default_debounce_ms(),
            admin_emails: Vec::new(),
            levels: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    pub fn authorization_policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::new(&self.admin_emails)
    }

    /// Configured level order, or the six default levels when none are listed
    pub fn level_order(&self) -> Result<LevelOrder> {
        if self.levels.is_empty() {
            return Ok(LevelOrder::default());
        }
        LevelOrder::new(
            self.levels
                .iter()
                .map(|l| Level::new(l.id.clone(), l.name.clone()))
                .collect(),
        )
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            document_path: self.document_path.clone(),
            debounce: self.debounce_window(),
        }
    }
}

/// Parse a config file. A missing or malformed file is an error.
pub fn load_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load `path` if it exists, otherwise warn and fall back to defaults.
/// With no explicit path the platform config location is tried.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => {
                warn!("No platform config directory; using default configuration");
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        warn!("Config file not found: {}; using defaults", path.display());
        return Ok(TomlConfig::default());
    }
    let config = load_config(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// `<config dir>/stripes/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stripes").join("config.toml"))
}

pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    default_root_folder()
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("stripes"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\stripes"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("stripes"))
            .unwrap_or_else(|| PathBuf::from("./stripes_data"))
    }
}

pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 5780);
        assert_eq!(config.document_path, "stripes/shared");
        assert_eq!(config.debounce_window(), Duration::from_secs(1));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.level_order().unwrap(), LevelOrder::default());
    }

    #[test]
    fn test_levels_and_admins_from_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            admin_emails = ["Teacher@Example.com"]
            debounce_ms = 250

            [[levels]]
            id = "white"
            name = "White Stripe"

            [[levels]]
            id = "yellow"
            name = "Yellow Stripe"
            "#,
        )
        .unwrap();

        let levels = config.level_order().unwrap();
        assert_eq!(levels.first().id, "white");
        assert!(levels.is_last("yellow"));
        assert!(config.authorization_policy().is_privileged("teacher@example.com"));
        assert_eq!(config.session_config().debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_duplicate_levels_rejected() {
        let config: TomlConfig = toml::from_str(
            r#"
            [[levels]]
            id = "a"
            name = "A"
            [[levels]]
            id = "a"
            name = "Again"
            "#,
        )
        .unwrap();
        assert!(matches!(config.level_order(), Err(Error::Config(_))));
    }

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path(Path::new("/srv/stripes")),
            PathBuf::from("/srv/stripes/stripes.db")
        );
    }
}
