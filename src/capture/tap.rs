//! Pass-through response tap.
//!
//! [`tap_response`] wraps a downstream response so that its body streams to
//! the client unchanged while a capped copy is kept for the capture record.
//! Completion fires once: at end of stream, on a body error, or when the body
//! is dropped before finishing (client went away, HEAD request).
//!
//! `content-length` is stripped from the head and the tap reports an unknown
//! size, so the server frames the body itself. This is the only change a
//! client can observe.
//!
//! [`tap_request`] is the request-side counterpart: the body reaches the
//! downstream frame by frame, untouched, and a capped copy accumulates in a
//! shared [`BodyCopy`] as it is read.

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use crate::capture::record::HeaderSnapshot;
use crate::capture::snapshot::{normalize_headers, CapturePolicy};

/// Everything the tap saw of one response.
#[derive(Debug)]
pub struct TapOutcome {
    pub status: StatusCode,
    /// Normalized response head, after `content-length` removal.
    pub headers: HeaderSnapshot,
    pub trailers: Option<HeaderMap>,
    /// Leading bytes of the body, `None` when the policy refused it.
    pub body: Option<Bytes>,
}

type OnComplete = Box<dyn FnOnce(TapOutcome) + Send>;

/// Body wrapper that forwards every frame and keeps a capped copy.
pub struct TapBody {
    inner: Body,
    status: StatusCode,
    headers: HeaderSnapshot,
    buffer: Option<BytesMut>,
    limit: usize,
    trailers: Option<HeaderMap>,
    on_complete: Option<OnComplete>,
}

impl TapBody {
    fn record_data(&mut self, data: &Bytes) {
        if let Some(buffer) = self.buffer.as_mut() {
            let room = self.limit.saturating_sub(buffer.len());
            let take = room.min(data.len());
            if take > 0 {
                buffer.extend_from_slice(&data[..take]);
            }
        }
    }

    fn record_trailers(&mut self, trailers: &HeaderMap) {
        match self.trailers.as_mut() {
            Some(existing) => existing.extend(trailers.clone()),
            None => self.trailers = Some(trailers.clone()),
        }
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(TapOutcome {
                status: self.status,
                headers: std::mem::take(&mut self.headers),
                trailers: self.trailers.take(),
                body: self.buffer.take().map(BytesMut::freeze),
            });
        }
    }
}

impl HttpBody for TapBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.record_data(data);
                } else if let Some(trailers) = frame.trailers_ref() {
                    this.record_trailers(trailers);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, "Downstream body failed mid-stream");
                this.complete();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

impl Drop for TapBody {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Route a response through the tap. `on_complete` runs exactly once.
pub fn tap_response<F>(response: Response, policy: &CapturePolicy, on_complete: F) -> Response
where
    F: FnOnce(TapOutcome) + Send + 'static,
{
    let (mut parts, body) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);

    let headers = normalize_headers(&parts.headers);
    let buffer = policy.admits(&headers).then(BytesMut::new);

    let tap = TapBody {
        inner: body,
        status: parts.status,
        headers,
        buffer,
        limit: policy.body_capture_size(),
        trailers: None,
        on_complete: Some(Box::new(on_complete)),
    };

    Response::from_parts(parts, Body::new(tap))
}

/// Capped copy of a request body, filled while the downstream reads it.
#[derive(Debug, Clone)]
pub struct BodyCopy {
    buffer: Arc<Mutex<BytesMut>>,
    limit: usize,
}

impl BodyCopy {
    fn new(limit: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BytesMut::new())),
            limit,
        }
    }

    fn append(&self, data: &Bytes) {
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        let take = self.limit.saturating_sub(buffer.len()).min(data.len());
        if take > 0 {
            buffer.extend_from_slice(&data[..take]);
        }
    }

    /// Bytes read so far, at most the capture limit.
    pub fn snapshot(&self) -> Bytes {
        self.buffer
            .lock()
            .map(|buffer| Bytes::copy_from_slice(&buffer))
            .unwrap_or_default()
    }
}

/// Request body wrapper feeding a [`BodyCopy`].
pub struct RequestTapBody {
    inner: Body,
    copy: BodyCopy,
}

impl HttpBody for RequestTapBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if let Some(data) = frame.as_ref().and_then(|f| f.as_ref().ok()).and_then(Frame::data_ref) {
            this.copy.append(data);
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Wrap a request body so its leading `limit` bytes are kept as it streams.
pub fn tap_request(body: Body, limit: usize) -> (Body, BodyCopy) {
    let copy = BodyCopy::new(limit);
    let tap = RequestTapBody {
        inner: body,
        copy: copy.clone(),
    };
    (Body::new(tap), copy)
}
