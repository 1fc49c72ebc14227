//! Bulk import of line-delimited JSON events into Amplitude's batch API.
//!
//! A file is read lazily, grouped into fixed-size batches, and each batch is
//! uploaded by a bounded pool of concurrent tasks with retry. See
//! [`pipeline::Importer`] for the entry point.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod upload;
