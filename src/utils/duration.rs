use crate::error::{MutexError, Result};
use std::time::Duration;

const FORMAT_HINT: &str = "expected format: NUMBER[s|m|h|d] (e.g., '30s', '5m', '2h', '7d')";

/// Parse a duration string like "30s", "5m", "2h", "7d"
/// Defaults to seconds if no unit specified
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(MutexError::InvalidDuration {
            input: s.to_string(),
            message: "empty string".to_string(),
        });
    }

    let (num_str, unit_secs) = match s.char_indices().last() {
        Some((idx, 's')) => (&s[..idx], 1),
        Some((idx, 'm')) => (&s[..idx], 60),
        Some((idx, 'h')) => (&s[..idx], 60 * 60),
        Some((idx, 'd')) => (&s[..idx], 60 * 60 * 24),
        _ => (s, 1),
    };

    let invalid = |message: &str| MutexError::InvalidDuration {
        input: s.to_string(),
        message: message.to_string(),
    };

    let value: u64 = num_str.parse().map_err(|_| invalid(FORMAT_HINT))?;
    let seconds = value
        .checked_mul(unit_secs)
        .ok_or_else(|| invalid("duration is too large"))?;

    Ok(Duration::from_secs(seconds))
}

/// Parse a lock timeout: whole seconds, greater than zero
pub fn parse_timeout_secs(s: &str) -> Result<u64> {
    let seconds = parse_duration(s)?.as_secs();
    if seconds == 0 {
        return Err(MutexError::InvalidTimeout { timeout: 0 });
    }
    Ok(seconds)
}
