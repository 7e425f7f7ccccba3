//! Integration tests for logging helpers and the global subscriber

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, mask_email, redact_if_sensitive, LogFormat, LoggingConfig,
};

#[test]
fn test_pii_redaction_secrets() {
    assert_eq!(redact_if_sensitive("id_token", "eyJhbGciOi"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter22"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("api_key", "AIzaSy"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("email", "reader@example.com");

    assert_eq!(redacted, "re***@example.com");
    assert!(!redacted.contains("reader"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("book_id", "zyTCAlFPjgYC"), "zyTCAlFPjgYC");
    assert_eq!(redact_if_sensitive("user_id", "uid-42"), "uid-42");
    assert_eq!(mask_email("x@y.z"), "x***@y.z");
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_spans(false);

    assert!(init_logging(config.clone()).is_ok());
    tracing::info!(book_id = "b1", "logging initialized");

    // A second global subscriber is rejected
    assert!(init_logging(config).is_err());
}

#[test]
fn test_invalid_custom_filter_is_rejected() {
    let config = LoggingConfig::default().with_filter("core_sync=notalevel");
    assert!(init_logging(config).is_err());
}
