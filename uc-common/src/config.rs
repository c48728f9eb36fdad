//! Configuration loading and data folder resolution
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file is never fatal: a warning is logged and
//! the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "UC_CONFIG";
/// Environment variable overriding the data folder
pub const ENV_DATA_DIR: &str = "UC_DATA_DIR";
/// Environment variable overriding the listen address
pub const ENV_BIND: &str = "UC_BIND";
/// Environment variable overriding the log level
pub const ENV_LOG: &str = "UC_LOG";

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "ultracoach.db";

// ========================================
// TOML file schema
// ========================================

/// On-disk configuration; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub data_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Credential and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 168,
            min_password_length: 8,
        }
    }
}

/// Race import limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub max_file_bytes: usize,
    pub max_races_per_import: usize,
    pub imports_per_minute: u32,
    pub duplicate_threshold: f64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_races_per_import: 100,
            imports_per_minute: 5,
            duplicate_threshold: 0.80,
        }
    }
}

/// Event bus sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
    }

    /// Load the config file if one can be found, otherwise defaults
    ///
    /// `explicit` is the `--config` argument; when it is absent the
    /// `UC_CONFIG` variable and then the platform locations are consulted.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var(ENV_CONFIG)
                .ok()
                .map(PathBuf::from)
                .or_else(find_config_file),
        };

        let Some(path) = path else {
            debug!("No config file found, using compiled defaults");
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                debug!("Loaded config file {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Locate the platform config file, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ultracoach").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ultracoach/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

// ========================================
// Compiled defaults
// ========================================

/// OS-dependent fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("ultracoach"))
            .unwrap_or_else(|| PathBuf::from("./ultracoach_data"));

        Self {
            data_dir,
            bind: SocketAddr::from(([127, 0, 0, 1], 5780)),
            log_level: "info".to_string(),
        }
    }
}

// ========================================
// Data folder resolution
// ========================================

/// Resolves the data folder from CLI, environment, TOML and defaults
pub struct DataDirResolver<'a> {
    cli_arg: Option<&'a Path>,
    toml: Option<&'a TomlConfig>,
}

impl<'a> DataDirResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, toml: Option<&'a TomlConfig>) -> Self {
        Self { cli_arg, toml }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ENV_DATA_DIR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.toml.and_then(|t| t.data_dir.clone()) {
            return path;
        }

        CompiledDefaults::for_current_platform().data_dir
    }
}

/// Creates the data folder and locates files inside it
pub struct DataDirInitializer {
    data_dir: PathBuf,
}

impl DataDirInitializer {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Create the data folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
            tracing::info!("Created data folder: {}", self.data_dir.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

// ========================================
// Fully resolved configuration
// ========================================

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
}

/// Effective server configuration after applying the priority order
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub log_level: String,
    pub auth: AuthConfig,
    pub import: ImportConfig,
    pub events: EventsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            data_dir: defaults.data_dir,
            bind: defaults.bind,
            log_level: defaults.log_level,
            auth: AuthConfig::default(),
            import: ImportConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Resolve the configuration for this process
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml = TomlConfig::load_or_default(cli.config_file.as_deref());
        Self::from_sources(cli, toml)
    }

    /// Apply CLI and environment overrides on top of a parsed TOML config
    pub fn from_sources(cli: &CliOverrides, toml: TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let data_dir = DataDirResolver::new(cli.data_dir.as_deref(), Some(&toml)).resolve();

        let bind_str = cli
            .bind
            .clone()
            .or_else(|| std::env::var(ENV_BIND).ok())
            .or_else(|| toml.bind.clone());
        let bind = match bind_str {
            Some(s) => s
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", s, e)))?,
            None => defaults.bind,
        };

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| std::env::var(ENV_LOG).ok())
            .or_else(|| toml.log_level.clone())
            .unwrap_or(defaults.log_level);

        let config = Self {
            data_dir,
            bind,
            log_level,
            auth: toml.auth,
            import: toml.import,
            events: toml.events,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the server misbehave
    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_hours <= 0 {
            return Err(Error::Config("auth.session_ttl_hours must be positive".into()));
        }
        if self.auth.min_password_length == 0 || self.auth.min_password_length > 128 {
            return Err(Error::Config(
                "auth.min_password_length must be between 1 and 128".into(),
            ));
        }
        if self.import.max_file_bytes == 0 || self.import.max_races_per_import == 0 {
            return Err(Error::Config("import limits must be positive".into()));
        }
        if self.import.imports_per_minute == 0 {
            return Err(Error::Config("import.imports_per_minute must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.import.duplicate_threshold) {
            return Err(Error::Config(
                "import.duplicate_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(Error::Config("events.channel_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let toml: TomlConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:8080"

            [import]
            imports_per_minute = 10
            "#,
        )
        .unwrap();

        assert_eq!(toml.bind.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(toml.import.imports_per_minute, 10);
        assert_eq!(toml.import.max_races_per_import, 100);
        assert_eq!(toml.auth.session_ttl_hours, 168);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = ServerConfig::default();
        config.import.duplicate_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_inside_data_dir() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/tmp/uc"),
            ..ServerConfig::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/uc/ultracoach.db"));
    }
}
