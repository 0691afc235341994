//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::temporal::{parse_timestamp, TemporalError};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_invalid_identifier() {
    let error = CoreError::invalid_identifier("id 'abc' is invalid");

    match error {
        CoreError::InvalidIdentifier(msg) => assert!(msg.contains("abc")),
        _ => panic!("Expected InvalidIdentifier error"),
    }
}

#[test]
fn test_core_error_not_found() {
    let error = CoreError::not_found("Sale not found");

    match error {
        CoreError::NotFound(msg) => assert_eq!(msg, "Sale not found"),
        _ => panic!("Expected NotFound error"),
    }
}

#[test]
fn test_core_error_from_temporal_error() {
    let temporal = parse_timestamp("not-a-date").unwrap_err();
    assert_eq!(temporal, TemporalError::InvalidTimestamp("not-a-date".to_string()));

    let core_error: CoreError = temporal.into();
    assert!(matches!(core_error, CoreError::Temporal(_)));
}

#[test]
fn test_core_error_display() {
    let error = CoreError::validation("Test error");
    let display = format!("{}", error);

    assert!(display.contains("Validation error"));
}
