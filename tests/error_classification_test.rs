use spinlease::{MutexError, StoreError};
use std::io;
use std::time::Duration;

#[test]
fn test_acquire_timeout_is_retryable() {
    let err = MutexError::lock_acquire_timeout("lock_a", Duration::from_secs(3));
    assert!(err.is_retryable());
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("lock_a"));
}

#[test]
fn test_execution_outside_lock_classification() {
    let err = MutexError::ExecutionOutsideLock {
        key: "lock_a".to_string(),
        elapsed: Duration::from_secs(4),
        timeout: Duration::from_secs(3),
    };
    assert!(!err.is_retryable());
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_release_message_explains_missing_lease() {
    let err = MutexError::LockRelease {
        key: "lock_a".to_string(),
        source: None,
    };
    assert!(err.to_string().contains("no longer present"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_release_chains_store_error() {
    let err = MutexError::LockRelease {
        key: "lock_a".to_string(),
        source: Some(StoreError::Other("connection reset".to_string())),
    };
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "connection reset");
}

#[test]
fn test_configuration_errors_are_fatal() {
    assert_eq!(MutexError::InvalidTimeout { timeout: 0 }.exit_code(), 1);
    assert!(!MutexError::InvalidName.is_retryable());
}

#[test]
fn test_interrupted_error_classification() {
    let err = MutexError::from(io::Error::from(io::ErrorKind::Interrupted));
    assert_eq!(err.exit_code(), 3);
}
