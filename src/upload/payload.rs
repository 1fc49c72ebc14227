use crate::source::event::EventRecord;
use serde::Serialize;

/// Wire body for the batch endpoint: `{"api_key": ..., "events": [...]}`.
///
/// Borrows the batch, so each attempt builds its own payload without
/// copying events.
#[derive(Debug, Serialize)]
pub struct UploadPayload<'a> {
    pub api_key: &'a str,
    pub events: &'a [EventRecord],
}

impl<'a> UploadPayload<'a> {
    pub fn new(api_key: &'a str, events: &'a [EventRecord]) -> Self {
        Self { api_key, events }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
