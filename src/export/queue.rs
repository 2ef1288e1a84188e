//! Bounded export queue with drop-on-full enqueue.
//!
//! Producers are request handlers and must never wait on the collector, so
//! enqueue only ever tries once. Consumers are the export workers, which
//! wait on an empty queue.
//!
//! Workers hold a [`QueueConsumer`]: the receiving end plus a weak sender for
//! retries. Once every [`ExportQueue`] handle is dropped the channel closes,
//! and workers exit after draining what is left.

use async_channel::{Receiver, Sender, TrySendError, WeakSender};

use crate::export::job::ExportJob;

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// Queue at capacity; the job was discarded.
    Full,
    /// Queue closed; the job was discarded.
    Closed,
}

impl EnqueueOutcome {
    /// Label used for drop metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnqueueOutcome::Enqueued => "enqueued",
            EnqueueOutcome::Full => "queue_full",
            EnqueueOutcome::Closed => "queue_closed",
        }
    }
}

/// Multi-producer, multi-consumer queue of pending exports.
#[derive(Debug, Clone)]
pub struct ExportQueue {
    tx: Sender<ExportJob>,
    rx: Receiver<ExportJob>,
}

impl ExportQueue {
    /// Create a queue holding at most `capacity` jobs (at least one).
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn try_enqueue(&self, job: ExportJob) -> EnqueueOutcome {
        match self.tx.try_send(job) {
            Ok(()) => EnqueueOutcome::Enqueued,
            Err(TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Wait for the next job. `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<ExportJob> {
        self.rx.recv().await.ok()
    }

    /// Stop accepting jobs. Jobs already queued can still be dequeued.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    /// Consumer handle that does not keep the queue open.
    pub(crate) fn consumer(&self) -> QueueConsumer {
        QueueConsumer {
            rx: self.rx.clone(),
            retry_tx: self.tx.downgrade(),
        }
    }
}

/// Worker side of an [`ExportQueue`].
#[derive(Debug, Clone)]
pub(crate) struct QueueConsumer {
    rx: Receiver<ExportJob>,
    retry_tx: WeakSender<ExportJob>,
}

impl QueueConsumer {
    /// Wait for the next job. `None` once the queue is closed and drained.
    pub(crate) async fn dequeue(&self) -> Option<ExportJob> {
        self.rx.recv().await.ok()
    }

    /// Put a job back, with the same drop-on-full rule producers follow.
    pub(crate) fn try_requeue(&self, job: ExportJob) -> EnqueueOutcome {
        match self.retry_tx.upgrade() {
            Some(tx) => match tx.try_send(job) {
                Ok(()) => EnqueueOutcome::Enqueued,
                Err(TrySendError::Full(_)) => EnqueueOutcome::Full,
                Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
            },
            None => EnqueueOutcome::Closed,
        }
    }
}
