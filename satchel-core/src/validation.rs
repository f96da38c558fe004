use crate::error::{SatchelError, SatchelResult};

/// Maximum number of characters in a queue or stream name.
pub const QUEUE_NAME_MAX_LEN: usize = 160;

/// Upper bound for visibility timeouts and delivery delays, in seconds
/// (around 115 days).
pub const MAX_INTERVAL_S: i64 = 9_999_999;

/// Checks a queue name against `^[A-Za-z0-9._-]{1,160}$`.
pub fn validate_queue_name(name: &str) -> SatchelResult<()> {
    if name.is_empty() {
        return Err(SatchelError::InvalidQueueName);
    }
    if name.len() > QUEUE_NAME_MAX_LEN {
        return Err(SatchelError::QueueNameTooLong(QUEUE_NAME_MAX_LEN));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
    {
        return Err(SatchelError::InvalidCharacter(bad));
    }
    Ok(())
}

/// Checks that a value lies between the given bounds, inclusive.
pub fn validate_range(value: i64, min: Option<i64>, max: Option<i64>) -> SatchelResult<()> {
    if let Some(min) = min {
        if value < min {
            return Err(SatchelError::ValueTooLow(min));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(SatchelError::ValueTooHigh(max));
        }
    }
    Ok(())
}

/// Checks a visibility timeout or delivery delay, in seconds.
pub fn validate_interval(value: u32) -> SatchelResult<()> {
    validate_range(i64::from(value), Some(0), Some(MAX_INTERVAL_S))
}
