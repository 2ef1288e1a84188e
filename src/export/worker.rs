//! Export workers.
//!
//! Each worker loops on the shared queue and performs one POST per job.
//! A transport failure re-queues the job once, through the same
//! non-blocking enqueue the request path uses. Response status is not
//! inspected.

use std::sync::Arc;
use std::time::Instant;

use crate::export::job::ExportJob;
use crate::export::queue::{EnqueueOutcome, QueueConsumer};
use crate::export::stats::ExportStats;

pub(crate) struct Worker {
    id: usize,
    queue: QueueConsumer,
    client: reqwest::Client,
    stats: Arc<ExportStats>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        queue: QueueConsumer,
        client: reqwest::Client,
        stats: Arc<ExportStats>,
    ) -> Self {
        Self {
            id,
            queue,
            client,
            stats,
        }
    }

    pub(crate) async fn run(self) {
        tracing::trace!(worker = self.id, "Export worker started");
        while let Some(job) = self.queue.dequeue().await {
            self.deliver(job).await;
        }
        tracing::debug!(worker = self.id, "Export queue closed, worker exiting");
    }

    async fn deliver(&self, job: ExportJob) {
        let started = Instant::now();
        let result = self
            .client
            .post(job.url().clone())
            .headers(job.headers().clone())
            .body(job.payload().clone())
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                // Drain so the connection can return to the pool.
                if let Err(err) = response.bytes().await {
                    tracing::debug!(worker = self.id, error = %err, "Failed to drain collector response");
                }
                if !status.is_success() {
                    tracing::debug!(worker = self.id, status = %status, "Collector returned non-success status");
                }
                self.stats.record_delivered(started);
            }
            Err(err) => {
                tracing::debug!(
                    worker = self.id,
                    requeued = job.is_requeued(),
                    error = %err,
                    "Export delivery failed"
                );
                self.stats.record_failed();
                self.retry(job);
            }
        }
    }

    fn retry(&self, job: ExportJob) {
        let Some(retry) = job.into_requeued() else {
            self.stats.record_dropped("retry_exhausted");
            return;
        };
        match self.queue.try_requeue(retry) {
            EnqueueOutcome::Enqueued => self.stats.record_requeued(),
            outcome => self.stats.record_dropped(outcome.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::queue::ExportQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn worker_exits_when_every_producer_is_gone() {
        let queue = ExportQueue::bounded(4);
        let stats = Arc::new(ExportStats::default());
        let worker = Worker::new(0, queue.consumer(), reqwest::Client::new(), stats);
        let handle = tokio::spawn(worker.run());

        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker still running")
            .unwrap();
    }
}
