use spinlease::utils::{parse_duration, parse_timeout_secs};
use std::time::Duration;

#[test]
fn test_parse_seconds() {
    assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
}

#[test]
fn test_parse_minutes_hours_days() {
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604800));
}

#[test]
fn test_parse_invalid_format() {
    assert!(parse_duration("invalid").is_err());
    assert!(parse_duration("10x").is_err());
    assert!(parse_duration("").is_err());
    assert!(parse_duration("-3s").is_err());
}

#[test]
fn test_timeout_must_be_positive() {
    assert_eq!(parse_timeout_secs("3s").unwrap(), 3);
    assert_eq!(parse_timeout_secs("2m").unwrap(), 120);
    assert!(parse_timeout_secs("0").is_err());
}

#[test]
fn test_error_message_quality() {
    let msg = parse_duration("10x").unwrap_err().to_string();
    assert!(msg.contains("10x"));
    assert!(msg.contains("NUMBER[s|m|h|d]"));
}
