use crate::source::timestamp::{to_epoch_millis, TimestampError};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field holding the source timestamp on every input line.
pub const EVENT_TIME_FIELD: &str = "event_time";

/// Field set on every record with the normalized epoch-millisecond time.
pub const TIME_FIELD: &str = "time";

/// One decoded event: an arbitrary JSON object plus the normalized `time`.
pub type EventRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line is not a JSON object")]
    NotAnObject,

    #[error("missing 'event_time' field")]
    MissingEventTime,

    #[error("'event_time' is not a string")]
    EventTimeNotString,

    #[error("unparsable 'event_time': {0}")]
    Timestamp(#[from] TimestampError),
}

/// Decode one raw line into an [`EventRecord`] and stamp it with `time`.
///
/// Any existing `time` field is overwritten. All other fields pass through
/// untouched.
pub fn normalize_line(line: &str) -> Result<EventRecord, MalformedEvent> {
    let value: Value = serde_json::from_str(line.trim())?;
    let Value::Object(mut record) = value else {
        return Err(MalformedEvent::NotAnObject);
    };

    let millis = match record.get(EVENT_TIME_FIELD) {
        None | Some(Value::Null) => return Err(MalformedEvent::MissingEventTime),
        Some(Value::String(raw)) => to_epoch_millis(raw)?,
        Some(_) => return Err(MalformedEvent::EventTimeNotString),
    };

    record.insert(TIME_FIELD.to_string(), Value::from(millis));
    Ok(record)
}
