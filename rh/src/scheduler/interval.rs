//! Poll interval parsing
//!
//! Accepts a sequence of `<number><unit>` parts with units `ms`, `s`, `m`
//! and `h` (`45s`, `3m`, `1h30m`, `500ms`). A bare integer is seconds and an
//! empty string means the default interval.

use std::time::Duration;

use super::config::DEFAULT_INTERVAL;
use super::error::SchedulerError;

/// Parse interval text into a positive duration
pub fn parse_interval(input: &str) -> Result<Duration, SchedulerError> {
    let text = input.trim();
    let text = if text.is_empty() { DEFAULT_INTERVAL } else { text };

    if text.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = text
            .parse()
            .map_err(|_| SchedulerError::invalid_interval(input, "number too large"))?;
        return positive(input, Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(SchedulerError::invalid_interval(input, "expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| SchedulerError::invalid_interval(input, "number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
        let part = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "" => return Err(SchedulerError::invalid_interval(input, "missing unit")),
            unit => return Err(SchedulerError::invalid_interval(input, format!("unknown unit {:?}", unit))),
        };
        rest = &rest[unit_len..];

        total = part
            .and_then(|p| total.checked_add(p))
            .ok_or_else(|| SchedulerError::invalid_interval(input, "interval too large"))?;
    }

    positive(input, total)
}

fn positive(input: &str, duration: Duration) -> Result<Duration, SchedulerError> {
    if duration.is_zero() {
        Err(SchedulerError::invalid_interval(input, "interval must be greater than zero"))
    } else {
        Ok(duration)
    }
}
