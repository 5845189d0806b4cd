//! Integration tests for logging configuration

use core_runtime::Error;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LogLevel, LoggingConfig,
};

#[test]
fn test_logging_initialization_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("core_sync=debug");

    assert!(init_logging(config.clone()).is_ok());
    // A global subscriber can only be installed once per process
    assert!(init_logging(config).is_err());
}

#[test]
fn test_invalid_filter_rejected() {
    let config = LoggingConfig::default().with_filter("core_sync=notalevel[");
    let err = init_logging(config).unwrap_err();
    assert!(matches!(err, Error::Logging(_)));
    assert!(!err.is_config());
}

#[test]
fn test_pii_redaction_tokens() {
    assert_eq!(redact_if_sensitive("access_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "def"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("client_secret", "ghi"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("email", "user@example.com");
    assert!(redacted.starts_with('u'));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/lib/tunesync/sync.db"), "sync.db");
    assert_eq!(strip_path("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LogFormat::default(), LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LogFormat::default(), LogFormat::Json);
}
