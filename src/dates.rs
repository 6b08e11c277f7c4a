use crate::error::{Result, RuleError};
use chrono::{DateTime, NaiveDateTime, Utc};

/// RFC 2822 style date carrying a UTC offset, e.g. `27 Jun 2024 10:09:27 +0530`.
pub const DATE_FORMAT_WITH_OFFSET: &str = "%d %b %Y %H:%M:%S %z";

/// The same layout without an offset; such dates are taken to be UTC.
pub const DATE_FORMAT_NAIVE: &str = "%d %b %Y %H:%M:%S";

/// Parse a `date_received` value into a UTC instant.
///
/// A leading `Day, ` token is dropped without checking it against the date, and a
/// trailing `Z` zone reads as `+0000`. The offset-bearing format is tried first, then the
/// naive one. Every successful parse is normalized to UTC so callers never compare naive
/// and aware instants.
pub fn parse_email_datetime(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    let without_weekday = strip_weekday(trimmed);
    let normalized = match without_weekday.strip_suffix(" Z") {
        Some(rest) => format!("{rest} +0000"),
        None => without_weekday.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_str(&normalized, DATE_FORMAT_WITH_OFFSET) {
        return Ok(parsed.with_timezone(&Utc));
    }

    match NaiveDateTime::parse_from_str(&normalized, DATE_FORMAT_NAIVE) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(_) => Err(RuleError::DateParse {
            value: trimmed.to_string(),
        }),
    }
}

fn strip_weekday(value: &str) -> &str {
    match value.split_once(',') {
        Some((day, rest)) if !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => value,
    }
}
