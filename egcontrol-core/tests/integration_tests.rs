//! Integration tests for egcontrol-core infrastructure

use egcontrol_core::{
    config_error, init_logging, not_found_error, store_error, validation_error, EgControlConfig,
    EgControlError, LogFormat, LoggingConfig, StoreBackend,
};

#[tokio::test]
async fn test_error_handling() {
    let error = store_error!("Test store error", "test_component");

    match &error {
        EgControlError::Store {
            message, context, ..
        } => {
            assert_eq!(message, "Test store error");
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Store error"),
    }

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_store_error());
    assert!(config_error
        .context()
        .is_some_and(|c| c.recovery_suggestions.len() == 2));

    let validation = validation_error!("too short", "code", "test");
    assert!(matches!(
        validation,
        EgControlError::Validation { field: Some(ref f), .. } if f == "code"
    ));

    let missing = not_found_error!("users/42", "test");
    assert_eq!(missing.to_string(), "Resource not found: users/42");
}

#[test]
fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_to_file: false,
        log_file_path: None,
        enable_performance_monitoring: false,
        filter_directives: vec!["egcontrol_core=debug".to_string()],
    };

    assert!(init_logging(&config).is_ok());
    // A second global subscriber is refused instead of panicking
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_log_to_file_requires_path() {
    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };

    assert!(init_logging(&config).is_err());
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = EgControlConfig::ephemeral(dir.path());
    config.records.recent_limit = 5;
    config.save_to_file(&path).unwrap();

    let loaded = EgControlConfig::from_file(&path).unwrap();
    assert_eq!(loaded.records.recent_limit, 5);
    assert_eq!(loaded.store.backend, StoreBackend::Memory);
    assert_eq!(loaded.session.storage_dir, config.session.storage_dir);
}

#[test]
fn test_layered_load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = EgControlConfig::ephemeral(dir.path());
    config.records.recent_limit = 7;
    config.save_to_file(&path).unwrap();

    let loaded = EgControlConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded.records.recent_limit, 7);
    assert_eq!(loaded.store.backend, StoreBackend::Memory);
}

#[test]
fn test_load_rejects_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = EgControlConfig::ephemeral(dir.path());
    config.session.ttl_hours = 0;
    config.save_to_file(&path).unwrap();

    let result = EgControlConfig::load(Some(&path));
    assert!(matches!(result, Err(EgControlError::Config { .. })));
}

#[test]
fn test_verbose_logging_raises_crate_directives() {
    let mut config = LoggingConfig::default();
    config.filter_directives.push("sqlx".to_string());

    config.enable_verbose();

    assert_eq!(config.level, "debug");
    assert_eq!(
        config.filter_directives,
        vec![
            "egcontrol_core=debug".to_string(),
            "egcontrol_applications=debug".to_string(),
            "sqlx".to_string(),
        ]
    );
}
