//! Per-request capture orchestration.
//!
//! ```text
//! request head captured → request body tapped (policy permitting) → downstream invoked
//!     → response tapped → [body streams to client] → record completed → job enqueued
//! ```
//!
//! Both bodies stream. The record holds the leading bytes of the request body
//! that the downstream had read by the time the response finished.
//!
//! Nothing in this path returns an error to the client. Capture failures
//! degrade a single field or skip the export; the downstream handler always
//! runs exactly once.

use arc_swap::ArcSwap;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::capture::record::CaptureRecord;
use crate::capture::snapshot::{self, CapturePolicy};
use crate::capture::tap::{tap_request, tap_response};
use crate::export::{EnqueueOutcome, Exporter};
use crate::http::RequestId;
use crate::observability::metrics;

/// Captures exchanges and hands them to the [`Exporter`].
///
/// Cheap to clone; clones share the policy and the exporter.
#[derive(Clone)]
pub struct Interceptor {
    policy: Arc<ArcSwap<CapturePolicy>>,
    exporter: Exporter,
}

impl Interceptor {
    pub fn new(policy: CapturePolicy, exporter: Exporter) -> Self {
        Self {
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            exporter,
        }
    }

    /// Current capture policy.
    pub fn policy(&self) -> Arc<CapturePolicy> {
        self.policy.load_full()
    }

    /// Swap in a new policy. Requests already in flight keep the old one.
    pub fn update_policy(&self, policy: CapturePolicy) {
        tracing::info!(
            allowed_content_types = ?policy.allowed_content_types(),
            body_capture_size = policy.body_capture_size(),
            "Capture policy updated"
        );
        self.policy.store(Arc::new(policy));
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Capture one exchange around `downstream`, which is invoked exactly once.
    pub async fn intercept<F, Fut>(&self, request: Request, downstream: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        let started = Instant::now();
        let mut record = CaptureRecord::started_now();
        let policy = self.policy.load_full();

        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let request_id = RequestId::from_headers_or_new(request.headers());

        let (parts, body) = request.into_parts();
        record.request = snapshot::request_snapshot(&parts, &remote_addr);
        let request_url = snapshot::request_url(&parts, &record.request);
        metrics::record_capture(&record.request.method);

        let (body, request_copy) = if policy.admits(&record.request.headers) {
            let (body, copy) = tap_request(body, policy.body_capture_size());
            (body, Some(copy))
        } else {
            (body, None)
        };

        let response = downstream(Request::from_parts(parts, body)).await;

        let exporter = self.exporter.clone();
        tap_response(response, &policy, move |outcome| {
            record.request.body = request_copy.map(|copy| copy.snapshot());
            record.response = snapshot::response_snapshot(outcome, request_url);
            match exporter.submit(&record, started.elapsed(), &request_id) {
                Ok(EnqueueOutcome::Enqueued) => {}
                Ok(outcome) => {
                    tracing::debug!(request_id = %request_id, outcome = ?outcome, "Capture dropped");
                }
                Err(err) => {
                    tracing::debug!(request_id = %request_id, error = %err, "Capture not exported");
                }
            }
        })
    }
}

/// Axum middleware entry point, for `middleware::from_fn_with_state`.
pub async fn capture_middleware(
    State(interceptor): State<Interceptor>,
    request: Request,
    next: Next,
) -> Response {
    interceptor.intercept(request, |request| next.run(request)).await
}
