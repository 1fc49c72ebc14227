use crate::source::reader::Batch;
use crate::upload::client::{BatchSender, DeliveryFailure};
use crate::upload::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal state of one batch's delivery.
#[derive(Debug)]
pub enum TaskOutcome {
    Delivered {
        batch: u64,
        events: usize,
        attempts: u32,
    },
    Failed {
        batch: u64,
        events: usize,
        attempts: u32,
        error: DeliveryFailure,
    },
}

impl TaskOutcome {
    pub fn batch(&self) -> u64 {
        match self {
            TaskOutcome::Delivered { batch, .. } | TaskOutcome::Failed { batch, .. } => *batch,
        }
    }

    pub fn events(&self) -> usize {
        match self {
            TaskOutcome::Delivered { events, .. } | TaskOutcome::Failed { events, .. } => *events,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, TaskOutcome::Delivered { .. })
    }
}

/// Delivery of one batch, retries included. Owns its batch outright.
pub struct UploadTask {
    batch: Batch,
    sender: Arc<dyn BatchSender>,
    policy: Arc<RetryPolicy>,
}

impl UploadTask {
    pub fn new(batch: Batch, sender: Arc<dyn BatchSender>, policy: Arc<RetryPolicy>) -> Self {
        Self {
            batch,
            sender,
            policy,
        }
    }

    pub fn batch_index(&self) -> u64 {
        self.batch.index
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub async fn run(self) -> TaskOutcome {
        let index = self.batch.index;
        let events = self.batch.len();

        let result = self
            .policy
            .execute(|attempt| self.attempt(attempt))
            .await;

        match result {
            Ok(attempts) => TaskOutcome::Delivered {
                batch: index,
                events,
                attempts,
            },
            Err(exhausted) => TaskOutcome::Failed {
                batch: index,
                events,
                attempts: exhausted.attempts,
                error: exhausted.last,
            },
        }
    }

    async fn attempt(&self, attempt: u32) -> Result<(), DeliveryFailure> {
        match self.sender.send(&self.batch.events).await {
            Ok(()) => {
                info!(
                    batch = self.batch.index,
                    events = self.batch.len(),
                    attempt,
                    "Response completed successfully"
                );
                Ok(())
            }
            Err(failure) => {
                warn!(
                    batch = self.batch.index,
                    attempt,
                    status = failure.status(),
                    message = %failure,
                    body = failure.body(),
                    "Response failed"
                );
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RetryConfig;
    use crate::source::event::{normalize_line, EventRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls with a 503, then succeeds.
    struct FlakySender {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl BatchSender for FlakySender {
        async fn send(&self, _events: &[EventRecord]) -> Result<(), DeliveryFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(DeliveryFailure::Rejected {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                    body: "try later".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn make_batch(index: u64, size: usize) -> Batch {
        let events = (0..size)
            .map(|_| normalize_line(r#"{"event_time":"2024-03-01T00:00:00Z"}"#).unwrap())
            .collect();
        Batch {
            index,
            first_line: 1,
            events,
        }
    }

    fn fast_policy() -> Arc<RetryPolicy> {
        Arc::new(RetryPolicy::from(&RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter: false,
            max_elapsed: Duration::from_secs(5),
        }))
    }

    #[tokio::test]
    async fn test_delivered_after_retries() {
        let sender = Arc::new(FlakySender {
            failures: 3,
            calls: AtomicU32::new(0),
        });
        let task = UploadTask::new(make_batch(7, 4), sender.clone(), fast_policy());
        assert_eq!(task.batch_index(), 7);
        assert_eq!(task.len(), 4);

        let outcome = task.run().await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.batch(), 7);
        assert_eq!(outcome.events(), 4);
        assert!(matches!(outcome, TaskOutcome::Delivered { attempts: 4, .. }));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_carries_last_failure() {
        let sender = Arc::new(FlakySender {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let outcome = UploadTask::new(make_batch(2, 1), sender.clone(), fast_policy())
            .run()
            .await;

        match outcome {
            TaskOutcome::Failed {
                batch,
                attempts,
                error,
                ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(attempts, 10);
                assert_eq!(error.status(), Some(503));
                assert_eq!(error.body(), "try later");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(sender.calls.load(Ordering::SeqCst), 10);
    }
}
