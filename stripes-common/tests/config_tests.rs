//! Configuration loading and root folder resolution
//!
//! Tests that touch STRIPES_ROOT_FOLDER are #[serial] so they never race.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use stripes_common::config::{
    database_path, load_config, load_or_default, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV,
};
use stripes_common::Error;

fn config_with_root(root: &str) -> TomlConfig {
    TomlConfig {
        root_folder: Some(PathBuf::from(root)),
        ..TomlConfig::default()
    }
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let root = resolve_root_folder(Some(Path::new("/from/cli")), &config_with_root("/from/toml"));
    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let root = resolve_root_folder(None, &config_with_root("/from/toml"));
    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(None, &config_with_root("/from/toml")),
        PathBuf::from("/from/toml")
    );

    let fallback = resolve_root_folder(None, &TomlConfig::default());
    assert!(fallback.ends_with("stripes") || fallback.ends_with("stripes_data"));
    assert!(database_path(&fallback).ends_with("stripes.db"));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.port, 5780);
    assert!(config.admin_emails.is_empty());
}

#[test]
fn test_file_values_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        port = 6000
        store_url = "http://10.0.0.5:6000"
        admin_emails = ["teacher@example.com"]

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = load_or_default(Some(&path)).unwrap();
    assert_eq!(config.port, 6000);
    assert_eq!(config.store_url, "http://10.0.0.5:6000");
    assert_eq!(config.logging.level, "debug");
    assert!(config.authorization_policy().is_privileged("TEACHER@example.com"));
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();
    assert!(matches!(load_config(&path), Err(Error::Config(_))));
    assert!(matches!(load_or_default(Some(&path)), Err(Error::Config(_))));
}
