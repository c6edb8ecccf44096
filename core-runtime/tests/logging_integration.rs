//! Integration tests for logging system

use core_runtime::config::CatalogConfig;
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_from_catalog_config() {
    let config = CatalogConfig::builder()
        .in_memory()
        .logging(
            LoggingConfig::default()
                .with_format(LogFormat::Json)
                .with_level(LogLevel::Debug)
                .with_spans(true),
        )
        .build()
        .unwrap();

    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert!(config.logging.enable_spans);
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_invalid_filter_is_config_error() {
    let config = LoggingConfig::default().with_filter("core_library=shouting");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

// Only this test installs the global subscriber in this binary.
#[test]
fn test_second_initialization_fails() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Trace);

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::info!(album_id = "album-1", "logging initialized");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(msg)) if msg.contains("Failed to initialize")));
}
