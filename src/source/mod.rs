pub mod event;
pub mod reader;
pub mod timestamp;

pub use event::{normalize_line, EventRecord, MalformedEvent};
pub use reader::{Batch, EventBatcher, ReaderError};
pub use timestamp::{parse_timestamp, to_epoch_millis, TimestampError};
