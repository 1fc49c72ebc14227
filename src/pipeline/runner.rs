use crate::config::types::Config;
use crate::pipeline::pool::{PoolError, WorkerPool};
use crate::source::reader::{EventBatcher, ReaderError};
use crate::upload::client::BatchSender;
use crate::upload::retry::RetryPolicy;
use crate::upload::task::UploadTask;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, Instrument};

/// Errors that stop an import run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Counts reported at the end of a run.
///
/// `submitted_events` counts every event handed to the pool, whether or not
/// its batch was eventually accepted. `delivered_events` counts only events in
/// batches the endpoint confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub batches: u64,
    pub submitted_events: u64,
    pub delivered_batches: u64,
    pub delivered_events: u64,
    pub failed_batches: u64,
    pub failed_events: u64,
    pub skipped_lines: u64,
}

impl ImportSummary {
    pub fn all_delivered(&self) -> bool {
        self.batches == self.delivered_batches
    }
}

/// Reads a file, batches it, and uploads every batch through a bounded pool.
pub struct Importer {
    config: Config,
    sender: Arc<dyn BatchSender>,
    policy: Arc<RetryPolicy>,
}

impl Importer {
    pub fn new(config: Config, sender: Arc<dyn BatchSender>) -> Self {
        let policy = Arc::new(RetryPolicy::from(&config.retry));
        Self {
            config,
            sender,
            policy,
        }
    }

    /// Import `path` and wait for every upload to reach a terminal state.
    ///
    /// Batches are formed and submitted in file order but uploaded
    /// concurrently, so the endpoint may receive them in any order. A
    /// malformed line under the abort policy or a read error stops batch
    /// formation; uploads already submitted still finish before the error is
    /// returned.
    pub async fn run(&self, path: &Path) -> Result<ImportSummary, PipelineError> {
        info!(file = %path.display(), "Processing file");

        let mut batcher = EventBatcher::open(path, self.config.batch_size, self.config.on_parse_error)
            .map_err(|e| match e {
                ReaderError::Io(source) => PipelineError::Open {
                    path: path.to_path_buf(),
                    source,
                },
                other => PipelineError::Reader(other),
            })?;

        let mut pool = WorkerPool::new(self.config.concurrency);
        let mut summary = ImportSummary::default();
        let mut stopped_by: Option<PipelineError> = None;

        for next in &mut batcher {
            let batch = match next {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Stopped reading input");
                    stopped_by = Some(e.into());
                    break;
                }
            };

            let index = batch.index;
            let events = batch.len() as u64;
            let span = tracing::info_span!("upload", batch = index);
            let task = UploadTask::new(batch, self.sender.clone(), self.policy.clone());

            if let Err(e) = pool.submit(task.run().instrument(span)).await {
                stopped_by = Some(e.into());
                break;
            }

            summary.batches += 1;
            summary.submitted_events += events;
            info!(
                batch = index,
                events,
                total = summary.submitted_events,
                "Submitted batch of {} events ({} total)",
                events,
                summary.submitted_events
            );
        }

        summary.skipped_lines = batcher.skipped_lines();

        info!(outstanding = pool.outstanding(), "Waiting for uploads to finish");
        let stats = pool.join().await;

        summary.delivered_batches = stats.delivered_batches;
        summary.delivered_events = stats.delivered_events;
        summary.failed_batches = stats.failed_batches + stats.aborted_tasks;
        summary.failed_events = summary.submitted_events - summary.delivered_events;

        info!(
            submitted = summary.submitted_events,
            delivered = summary.delivered_events,
            failed_batches = summary.failed_batches,
            skipped_lines = summary.skipped_lines,
            "Found {} events for importing",
            summary.submitted_events
        );

        match stopped_by {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
