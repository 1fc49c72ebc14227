use crate::upload::task::TaskOutcome;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}

/// Tally of terminal task states, collected while the pool drains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub delivered_batches: u64,
    pub delivered_events: u64,
    pub failed_batches: u64,
    pub failed_events: u64,
    /// Tasks that panicked or were cancelled; their event counts are unknown
    pub aborted_tasks: u64,
}

impl PoolStats {
    pub fn completed(&self) -> u64 {
        self.delivered_batches + self.failed_batches + self.aborted_tasks
    }
}

/// Fixed-capacity pool of concurrent upload slots.
///
/// `submit` waits for a free slot before spawning, which is the backpressure
/// that keeps the file reader from running ahead of uploads. Tasks run on the
/// tokio runtime and finish in any order; nothing here orders deliveries
/// across batches.
pub struct WorkerPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    tasks: JoinSet<TaskOutcome>,
    stats: PoolStats,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks spawned and not yet reaped, finished or not.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Queue `task`, waiting until one of the `capacity` slots is free.
    ///
    /// Returns as soon as the task is spawned, never waiting for its result.
    pub async fn submit<F>(&mut self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        self.reap_finished();

        self.tasks.spawn(async move {
            let outcome = task.await;
            drop(permit);
            outcome
        });

        Ok(())
    }

    /// Wait until every submitted task has reached a terminal state.
    pub async fn join(mut self) -> PoolStats {
        debug!(outstanding = self.tasks.len(), "Draining worker pool");
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
        self.slots.close();
        self.stats
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<TaskOutcome, JoinError>) {
        match result {
            Ok(TaskOutcome::Delivered { events, .. }) => {
                self.stats.delivered_batches += 1;
                self.stats.delivered_events += events as u64;
            }
            Ok(TaskOutcome::Failed {
                batch,
                events,
                attempts,
                error,
            }) => {
                self.stats.failed_batches += 1;
                self.stats.failed_events += events as u64;
                error!(
                    batch,
                    events,
                    attempts,
                    status = error.status(),
                    error = %error,
                    body = error.body(),
                    "Batch delivery failed permanently"
                );
            }
            Err(join_error) => {
                self.stats.aborted_tasks += 1;
                error!(error = %join_error, "Upload task did not complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::client::DeliveryFailure;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn delivered(batch: u64, events: usize) -> TaskOutcome {
        TaskOutcome::Delivered {
            batch,
            events,
            attempts: 1,
        }
    }

    fn explode() -> TaskOutcome {
        panic!("upload task blew up")
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        for capacity in [1, 3, 8] {
            let mut pool = WorkerPool::new(capacity);
            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            for i in 0..40u64 {
                let running = running.clone();
                let peak = peak.clone();
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    delivered(i, 1)
                })
                .await
                .unwrap();
            }

            let stats = pool.join().await;
            assert_eq!(stats.delivered_batches, 40);
            assert!(peak.load(Ordering::SeqCst) <= capacity);
            assert!(peak.load(Ordering::SeqCst) >= 1);
        }
    }

    #[tokio::test]
    async fn test_submit_blocks_when_full() {
        let mut pool = WorkerPool::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        pool.submit(async move {
            let _ = release_rx.await;
            delivered(1, 1)
        })
        .await
        .unwrap();

        // The only slot is held, so the second submit cannot proceed
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), pool.submit(async { delivered(2, 1) }))
                .await;
        assert!(blocked.is_err());

        release_tx.send(()).unwrap();
        pool.submit(async { delivered(3, 1) }).await.unwrap();

        let stats = pool.join().await;
        assert_eq!(stats.delivered_batches, 2);
    }

    #[tokio::test]
    async fn test_join_waits_for_slow_tasks() {
        let mut pool = WorkerPool::new(4);
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..4u64 {
            let finished = finished.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(20 * (i + 1))).await;
                finished.fetch_add(1, Ordering::SeqCst);
                delivered(i, 10)
            })
            .await
            .unwrap();
        }

        let stats = pool.join().await;
        assert_eq!(finished.load(Ordering::SeqCst), 4);
        assert_eq!(stats.delivered_events, 40);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_counted() {
        let mut pool = WorkerPool::new(2);

        pool.submit(async { delivered(1, 5) }).await.unwrap();
        pool.submit(async {
            TaskOutcome::Failed {
                batch: 2,
                events: 7,
                attempts: 10,
                error: DeliveryFailure::Transport {
                    message: "connection reset".to_string(),
                },
            }
        })
        .await
        .unwrap();
        pool.submit(async { explode() }).await.unwrap();

        let stats = pool.join().await;
        assert_eq!(
            stats,
            PoolStats {
                delivered_batches: 1,
                delivered_events: 5,
                failed_batches: 1,
                failed_events: 7,
                aborted_tasks: 1,
            }
        );
        assert_eq!(stats.completed(), 3);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped_during_submit() {
        let mut pool = WorkerPool::new(2);
        assert_eq!(pool.capacity(), 2);

        for i in 0..10u64 {
            pool.submit(async move { delivered(i, 1) }).await.unwrap();
            tokio::task::yield_now().await;
        }

        // Reaping keeps the set from growing with every submission
        assert!(pool.outstanding() < 10);
        let stats = pool.join().await;
        assert_eq!(stats.delivered_batches, 10);
    }
}
