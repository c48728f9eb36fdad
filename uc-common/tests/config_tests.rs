//! Tests for configuration resolution and graceful degradation
//!
//! Uses serial_test to prevent environment variable races: tests that set
//! UC_* variables are marked #[serial].

use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use uc_common::config::{
    CliOverrides, CompiledDefaults, DataDirInitializer, DataDirResolver, ServerConfig, TomlConfig,
    ENV_BIND, ENV_DATA_DIR, ENV_LOG,
};

fn clear_env() {
    env::remove_var(ENV_DATA_DIR);
    env::remove_var(ENV_BIND);
    env::remove_var(ENV_LOG);
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.data_dir.as_os_str().is_empty());
    assert!(defaults.data_dir.to_string_lossy().contains("ultracoach"));
    assert_eq!(defaults.bind.port(), 5780);
    assert!(defaults.bind.ip().is_loopback());
    assert_eq!(defaults.log_level, "info");
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_env();

    let resolved = DataDirResolver::new(None, None).resolve();
    assert_eq!(resolved, CompiledDefaults::for_current_platform().data_dir);
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    clear_env();

    let toml = TomlConfig {
        data_dir: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    // TOML beats compiled default
    assert_eq!(
        DataDirResolver::new(None, Some(&toml)).resolve(),
        PathBuf::from("/from/toml")
    );

    // Environment beats TOML
    env::set_var(ENV_DATA_DIR, "/from/env");
    assert_eq!(
        DataDirResolver::new(None, Some(&toml)).resolve(),
        PathBuf::from("/from/env")
    );

    // CLI beats everything
    assert_eq!(
        DataDirResolver::new(Some(Path::new("/from/cli")), Some(&toml)).resolve(),
        PathBuf::from("/from/cli")
    );

    clear_env();
}

#[test]
#[serial]
fn test_missing_config_file_falls_back_to_defaults() {
    clear_env();

    let config = TomlConfig::load_or_default(Some(Path::new("/nonexistent/ultracoach.toml")));
    assert!(config.data_dir.is_none());
    assert_eq!(config.auth.session_ttl_hours, 168);
}

#[test]
#[serial]
fn test_malformed_config_file_falls_back_to_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "this is [not valid toml").unwrap();

    let config = TomlConfig::load_or_default(Some(file.path()));
    assert!(config.bind.is_none());
    assert_eq!(config.import.max_races_per_import, 100);
}

#[test]
#[serial]
fn test_server_config_from_file_and_overrides() {
    clear_env();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
data_dir = "/srv/ultracoach"
bind = "0.0.0.0:9000"
log_level = "debug"

[auth]
session_ttl_hours = 24

[import]
duplicate_threshold = 0.9
"#
    )
    .unwrap();

    let cli = CliOverrides {
        config_file: Some(file.path().to_path_buf()),
        bind: Some("127.0.0.1:7000".to_string()),
        ..CliOverrides::default()
    };
    let config = ServerConfig::resolve(&cli).unwrap();

    assert_eq!(config.data_dir, PathBuf::from("/srv/ultracoach"));
    assert_eq!(config.bind.port(), 7000, "CLI bind must win over TOML");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.auth.session_ttl_hours, 24);
    assert_eq!(config.auth.min_password_length, 8);
    assert!((config.import.duplicate_threshold - 0.9).abs() < f64::EPSILON);
    assert_eq!(config.events.channel_capacity, 256);
}

#[test]
#[serial]
fn test_env_overrides_toml_log_level() {
    clear_env();
    env::set_var(ENV_LOG, "trace");

    let toml = TomlConfig {
        log_level: Some("warn".to_string()),
        ..TomlConfig::default()
    };
    let config = ServerConfig::from_sources(&CliOverrides::default(), toml).unwrap();
    assert_eq!(config.log_level, "trace");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_bind_address_rejected() {
    clear_env();

    let cli = CliOverrides {
        bind: Some("not-an-address".to_string()),
        ..CliOverrides::default()
    };
    assert!(ServerConfig::from_sources(&cli, TomlConfig::default()).is_err());
}

#[test]
fn test_initializer_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("a").join("b");

    let initializer = DataDirInitializer::new(data_dir.clone());
    assert!(!initializer.database_exists());

    initializer.ensure_directory_exists().unwrap();
    assert!(data_dir.is_dir());
    // Idempotent
    initializer.ensure_directory_exists().unwrap();

    assert_eq!(initializer.database_path(), data_dir.join("ultracoach.db"));
}
