//! Config file loading tests

use std::path::PathBuf;
use tempfile::TempDir;
use tldw_common::config::{is_valid_key, load_service_config, load_toml_config, TomlConfig};
use tldw_common::Error;

#[test]
fn test_load_full_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tldw-ps.toml");
    std::fs::write(
        &path,
        r#"
port = 6000
max_concurrent_jobs = 4
request_timeout_secs = 120
work_dir = "/srv/tldw/work"
openai_api_key = "sk-test"

[retry]
max_attempts = 5
initial_delay_ms = 250
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.port, Some(6000));
    assert_eq!(config.max_concurrent_jobs, Some(4));
    assert_eq!(config.request_timeout_secs, Some(120));
    assert_eq!(config.work_dir, Some(PathBuf::from("/srv/tldw/work")));
    assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.retry.max_attempts, Some(5));
    assert_eq!(config.retry.initial_delay_ms, Some(250));
    assert_eq!(config.retry.timeout_ms, None);
}

#[test]
fn test_empty_toml_is_all_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();

    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_explicit_missing_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let result = load_service_config(Some(&missing), "tldw-ps");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_explicit_file_is_loaded() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    std::fs::write(&path, "port = 7001\n").unwrap();

    let config = load_service_config(Some(&path), "tldw-ps").unwrap();
    assert_eq!(config.port, Some(7001));
}

#[test]
fn test_key_validation() {
    assert!(is_valid_key("sk-abc"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key("   \t"));
}
