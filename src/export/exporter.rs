//! Exporter: the queue, the worker pool, and the shared collector client.
//!
//! Built once at startup and shared by every request. Workers run until the
//! queue is closed, either by [`Exporter::close`] or by dropping every
//! `Exporter` handle, and exit once it is drained.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::CaptureRecord;
use crate::config::{CaptureConfig, ExporterConfig};
use crate::export::job::{ExportJob, ExportTarget, MODULE_NAME_HEADERS, MODULE_VERSION_HEADERS};
use crate::export::queue::{EnqueueOutcome, ExportQueue};
use crate::export::stats::{ExportStats, ExportStatsSnapshot};
use crate::export::worker::Worker;
use crate::export::ExportError;
use crate::http::RequestId;

/// Handle to the export pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Exporter {
    queue: ExportQueue,
    target: Arc<ExportTarget>,
    stats: Arc<ExportStats>,
}

impl Exporter {
    /// Build the client, create the queue and spawn the workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(capture: &CaptureConfig, config: &ExporterConfig) -> Result<Self, ExportError> {
        let target = Arc::new(ExportTarget::new(&capture.tpa_endpoint, &capture.service_name)?);
        let client = build_client(config)?;
        let queue = ExportQueue::bounded(config.queue_capacity);
        let stats = Arc::new(ExportStats::default());

        for id in 0..config.workers {
            let worker = Worker::new(id, queue.consumer(), client.clone(), stats.clone());
            tokio::spawn(worker.run());
        }

        tracing::info!(
            endpoint = %target.url(),
            workers = config.workers,
            queue_capacity = queue.capacity(),
            "Export worker pool started"
        );

        Ok(Self {
            queue,
            target,
            stats,
        })
    }

    /// Serialize a record and enqueue it without waiting.
    pub fn submit(
        &self,
        record: &CaptureRecord,
        elapsed: Duration,
        request_id: &RequestId,
    ) -> Result<EnqueueOutcome, ExportError> {
        let payload = match record.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                self.stats.record_dropped("serialize");
                return Err(ExportError::Serialize(err));
            }
        };
        Ok(self.enqueue(self.target.job(payload, elapsed, request_id)))
    }

    pub fn enqueue(&self, job: ExportJob) -> EnqueueOutcome {
        let outcome = self.queue.try_enqueue(job);
        match outcome {
            EnqueueOutcome::Enqueued => self.stats.record_enqueued(),
            other => self.stats.record_dropped(other.as_str()),
        }
        outcome
    }

    pub fn stats(&self) -> ExportStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn target(&self) -> &ExportTarget {
        &self.target
    }

    /// Close the queue. Workers exit once it is drained.
    pub fn close(&self) {
        self.queue.close();
    }
}

fn build_client(config: &ExporterConfig) -> Result<reqwest::Client, ExportError> {
    let module_name =
        HeaderValue::from_str(&config.module_name).map_err(|source| ExportError::InvalidHeader {
            name: "module_name",
            source,
        })?;
    let module_version = HeaderValue::from_static(env!("CARGO_PKG_VERSION"));

    let mut headers = HeaderMap::new();
    for name in MODULE_NAME_HEADERS {
        headers.insert(HeaderName::from_static(name), module_name.clone());
    }
    for name in MODULE_VERSION_HEADERS {
        headers.insert(HeaderName::from_static(name), module_version.clone());
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .pool_max_idle_per_host(config.workers)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    Ok(client)
}
