//! Timestamps as printed by `kopia`, e.g. `2024-08-19T05:17:21.202557011Z`
//!
//! The fractional seconds vary in width between `kopia` versions, so parsing
//! never assumes a fixed number of digits.
//!
//! `kopia` always prints UTC with a `Z` suffix. Anything else jiff reads as an
//! absolute instant is accepted too: a numeric offset such as `+02:00`
//! (converted to UTC) or a space instead of the `T`. A time without any offset
//! is rejected, since it names no instant.

use crate::kopia::ReportError;
use jiff::Timestamp;

/// Parses an instant with a `Z` or numeric offset and any fractional-second width
///
/// # Errors
///
/// Returns an error naming `field` and the raw value if parsing fails
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<Timestamp, ReportError> {
    value
        .parse()
        .map_err(|source| ReportError::InvalidTimestamp {
            field,
            value: value.to_string(),
            source,
        })
}

/// Whole seconds from `start` to `end`, truncating any fractional remainder
///
/// # Errors
///
/// Returns an error if `end` is before `start`
pub fn whole_seconds_between(start: Timestamp, end: Timestamp) -> Result<i64, ReportError> {
    let elapsed = end.duration_since(start);
    if elapsed.is_negative() {
        return Err(ReportError::NegativeDuration { start, end });
    }
    Ok(elapsed.as_secs())
}

/// Unix seconds, including the fractional part
#[must_use]
pub fn unix_seconds(timestamp: Timestamp) -> f64 {
    timestamp.as_duration().as_secs_f64()
}
