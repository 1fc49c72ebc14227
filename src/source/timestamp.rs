use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,

    #[error("failed to parse timestamp '{value}': no supported format matched")]
    Unrecognized { value: String },
}

/// Formats carrying an explicit numeric offset (`+0200` or `+02:00`).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Formats without zone information. These are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse an absolute timestamp in any of the ISO-8601-like layouts seen in
/// event exports.
///
/// RFC 3339 is tried first, then date-times with an explicit offset, then
/// naive date-times (assumed UTC), and finally a bare date at midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    // A trailing "Z" that RFC 3339 rejected (e.g. space separator)
    let naive_value = value.strip_suffix('Z').unwrap_or(value);
    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(naive_value, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive_value, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimestampError::Unrecognized {
        value: value.to_string(),
    })
}

/// Parse a timestamp and convert it to epoch milliseconds.
///
/// Sub-millisecond precision is truncated.
pub fn to_epoch_millis(value: &str) -> Result<i64, TimestampError> {
    parse_timestamp(value).map(|dt| dt.timestamp_millis())
}
