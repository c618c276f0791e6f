//! Integration tests for configuration loading
//!
//! Each test uses its own environment prefix so tests can run in parallel.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use workers::{ConfigError, WorkersConfig};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [recovery]
        max_attempts = 5
        backoff_base = 3
        backoff_unit_ms = 250
        timeout_secs = 10

        [logging]
        level = "workers=debug"
        json = true
        "#,
    );

    let config = WorkersConfig::load_with_prefix(Some(file.path()), "CFGTEST_FILE_").unwrap();

    assert_eq!(config.recovery.max_attempts, 5);
    assert_eq!(config.logging.level, "workers=debug");
    assert!(config.logging.json);

    let policy = config.recovery.to_policy::<()>();
    assert_eq!(policy.delay_for(0), Duration::from_millis(250));
    assert_eq!(policy.delay_for(1), Duration::from_millis(750));
    assert_eq!(policy.timeout(), Some(Duration::from_secs(10)));
}

#[test]
fn test_env_overrides_file() {
    let file = write_config("[recovery]\nmax_attempts = 5\n");
    std::env::set_var("CFGTEST_ENV_MAX_ATTEMPTS", "7");
    std::env::set_var("CFGTEST_ENV_TIMEOUT_SECS", "2");
    std::env::set_var("CFGTEST_ENV_LOG_JSON", "yes");

    let config = WorkersConfig::load_with_prefix(Some(file.path()), "CFGTEST_ENV_").unwrap();

    assert_eq!(config.recovery.max_attempts, 7);
    assert_eq!(config.recovery.timeout_secs, Some(2));
    assert_eq!(config.recovery.backoff_base, 2);
    assert!(config.logging.json);
}

#[test]
fn test_malformed_env_value() {
    std::env::set_var("CFGTEST_BAD_BACKOFF_BASE", "fast");

    let err = WorkersConfig::load_with_prefix(None, "CFGTEST_BAD_").unwrap_err();
    match err {
        ConfigError::Env { key, .. } => assert_eq!(key, "CFGTEST_BAD_BACKOFF_BASE"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_zero_attempts_rejected_on_load() {
    std::env::set_var("CFGTEST_ZERO_MAX_ATTEMPTS", "0");

    let err = WorkersConfig::load_with_prefix(None, "CFGTEST_ZERO_").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = WorkersConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_defaults_without_file_or_env() {
    let config = WorkersConfig::load_with_prefix(None, "CFGTEST_NONE_").unwrap();
    assert_eq!(config, WorkersConfig::default());
}

#[test]
fn test_load_with_default_prefix() {
    let file = write_config(
        r#"
        [recovery]
        max_attempts = 4
        backoff_unit_ms = 20

        [logging]
        level = "warn"
        "#,
    );

    let config = WorkersConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.recovery.max_attempts, 4);
    assert_eq!(config.recovery.backoff_unit_ms, 20);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(
        config.recovery.to_policy::<()>().delay_for(2),
        Duration::from_millis(80)
    );

    let missing = tempfile::tempdir().unwrap();
    let absent = missing.path().join("workers.toml");
    let err = WorkersConfig::load(Some(absent.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
