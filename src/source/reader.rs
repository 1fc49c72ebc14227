use crate::config::types::ParseErrorStrategy;
use crate::source::event::{normalize_line, EventRecord, MalformedEvent};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event on line {line}: {source}")]
    Malformed {
        line: u64,
        #[source]
        source: MalformedEvent,
    },
}

/// An ordered group of normalized events, delivered in one request.
#[derive(Debug)]
pub struct Batch {
    /// 1-based position of this batch in the input
    pub index: u64,
    /// 1-based line number of the first event in the batch
    pub first_line: u64,
    pub events: Vec<EventRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Lazily turns a line-delimited JSON source into [`Batch`]es of at most
/// `batch_size` events.
///
/// Only the batch being formed is held in memory. Blank lines are ignored.
/// With [`ParseErrorStrategy::Abort`] the first malformed line ends the
/// iteration with an error and the partially formed batch is discarded.
/// With [`ParseErrorStrategy::Skip`] the line is logged and left out.
pub struct EventBatcher<R> {
    reader: R,
    batch_size: usize,
    on_parse_error: ParseErrorStrategy,
    line_number: u64,
    batches_formed: u64,
    skipped_lines: u64,
    finished: bool,
}

impl EventBatcher<BufReader<File>> {
    /// Open `path` for batching.
    pub fn open(
        path: &Path,
        batch_size: usize,
        on_parse_error: ParseErrorStrategy,
    ) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), batch_size, on_parse_error))
    }
}

impl<R: BufRead> EventBatcher<R> {
    pub fn new(reader: R, batch_size: usize, on_parse_error: ParseErrorStrategy) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            on_parse_error,
            line_number: 0,
            batches_formed: 0,
            skipped_lines: 0,
            finished: false,
        }
    }

    /// Lines dropped so far under [`ParseErrorStrategy::Skip`].
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    /// Lines read so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    fn next_batch(&mut self) -> Result<Option<Batch>, ReaderError> {
        let mut events = Vec::with_capacity(self.batch_size);
        let mut first_line = 0;
        let mut buf = Vec::new();

        while events.len() < self.batch_size {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            self.line_number += 1;

            let parsed = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => normalize_line(line),
                Err(e) => Err(MalformedEvent::InvalidUtf8(e)),
            };

            match parsed {
                Ok(record) => {
                    if events.is_empty() {
                        first_line = self.line_number;
                    }
                    events.push(record);
                }
                Err(source) => match self.on_parse_error {
                    ParseErrorStrategy::Abort => {
                        return Err(ReaderError::Malformed {
                            line: self.line_number,
                            source,
                        });
                    }
                    ParseErrorStrategy::Skip => {
                        self.skipped_lines += 1;
                        warn!(line = self.line_number, error = %source, "Skipping malformed event");
                    }
                },
            }
        }

        if events.is_empty() {
            return Ok(None);
        }

        self.batches_formed += 1;
        Ok(Some(Batch {
            index: self.batches_formed,
            first_line,
            events,
        }))
    }
}

impl<R: BufRead> Iterator for EventBatcher<R> {
    type Item = Result<Batch, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
