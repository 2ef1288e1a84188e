//! Snapshot building.
//!
//! Pure functions that turn an observed request head and an observed response
//! into the two halves of a [`CaptureRecord`](super::record::CaptureRecord).
//! Nothing in here performs I/O.

use axum::extract::OriginalUri;
use axum::http::{header, request, HeaderMap, Uri};
use bytes::Bytes;

use crate::capture::record::{HeaderSnapshot, RequestSnapshot, ResponseSnapshot};
use crate::capture::tap::TapOutcome;
use crate::capture::CaptureError;
use crate::config::CaptureConfig;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const CONTENT_TYPE: &str = "content-type";
const TRAILER_PREFIX: &str = "trailer:";
const GRPC_STATUS: &str = "grpc-status";

/// Decides which bodies are recorded and how much of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    allowed_content_types: Vec<String>,
    body_capture_size: usize,
}

impl CapturePolicy {
    pub fn new(allowed_content_types: Vec<String>, body_capture_size: usize) -> Self {
        Self {
            allowed_content_types,
            body_capture_size,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.allowed_content_types.clone(), config.body_capture_size)
    }

    /// Whether a body with these (normalized) headers may be recorded.
    pub fn admits(&self, headers: &HeaderSnapshot) -> bool {
        can_record_body(headers, &self.allowed_content_types)
    }

    /// Cut a body down to the configured ceiling.
    pub fn clip(&self, body: Bytes) -> Bytes {
        truncate_body(body, self.body_capture_size)
    }

    pub fn body_capture_size(&self) -> usize {
        self.body_capture_size
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.allowed_content_types
    }
}

/// Lower-case every header name and join repeated values with `;`.
pub fn normalize_headers(headers: &HeaderMap) -> HeaderSnapshot {
    let mut snapshot = HeaderSnapshot::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .collect::<Vec<_>>()
            .join(";");
        snapshot.insert(name.as_str().to_ascii_lowercase(), joined);
    }
    snapshot
}

/// Scheme as reported by a fronting proxy; never inferred from the connection.
pub fn forwarded_scheme(headers: &HeaderSnapshot) -> String {
    headers.get(FORWARDED_PROTO).cloned().unwrap_or_default()
}

/// True iff `content-type` is present, non-empty, and contains an allow-listed entry.
pub fn can_record_body(headers: &HeaderSnapshot, allowed_content_types: &[String]) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE) else {
        return false;
    };
    if content_type.is_empty() {
        return false;
    }
    allowed_content_types
        .iter()
        .any(|allowed| content_type.contains(allowed.as_str()))
}

/// Keep the leading `cap` bytes.
pub fn truncate_body(mut body: Bytes, cap: usize) -> Bytes {
    body.truncate(cap);
    body
}

/// Split a `host:port` remote address. Bracketed IPv6 hosts are unwrapped.
pub fn split_host_port(addr: &str) -> Result<(String, u16), CaptureError> {
    let (host, port) = match addr.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| CaptureError::UnclosedBracket(addr.to_string()))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| CaptureError::MissingPort(addr.to_string()))?;
            (host, port)
        }
        None => {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| CaptureError::MissingPort(addr.to_string()))?;
            if host.contains(':') {
                return Err(CaptureError::TooManyColons(addr.to_string()));
            }
            (host, port)
        }
    };

    let port = port.parse::<u16>().map_err(|source| CaptureError::InvalidPort {
        addr: addr.to_string(),
        source,
    })?;
    Ok((host.to_string(), port))
}

/// `scheme://host` followed by the original path and query, if all three are known.
pub fn build_request_url(scheme: &str, host: &str, path_and_query: &str) -> Option<String> {
    if scheme.is_empty() || host.is_empty() || path_and_query.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{host}{path_and_query}"))
}

pub fn is_grpc(headers: &HeaderSnapshot) -> bool {
    headers
        .get(CONTENT_TYPE)
        .is_some_and(|content_type| content_type.contains("grpc"))
}

/// gRPC carries its real status in a trailer; surface it as `grpc-status`.
pub fn promote_grpc_status(headers: &mut HeaderSnapshot) {
    if let Some(status) = headers.remove("trailer:grpc-status") {
        headers.insert(GRPC_STATUS.to_string(), status);
    }
}

/// The URI the client sent, before any router rewrote it.
pub fn original_uri(parts: &request::Parts) -> &Uri {
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri)
        .unwrap_or(&parts.uri)
}

fn request_host(parts: &request::Parts) -> String {
    parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| original_uri(parts).authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string()
}

/// Request half of the record. The body is filled in separately, since
/// reading it means consuming the request.
pub fn request_snapshot(parts: &request::Parts, remote_addr: &str) -> RequestSnapshot {
    let headers = normalize_headers(&parts.headers);
    let mut snapshot = RequestSnapshot {
        method: parts.method.to_string(),
        scheme: forwarded_scheme(&headers),
        path: original_uri(parts).path().to_string(),
        host: request_host(parts),
        headers,
        ..RequestSnapshot::default()
    };

    match split_host_port(remote_addr) {
        Ok((address, port)) => {
            snapshot.source_address = address;
            snapshot.source_port = i32::from(port);
        }
        Err(err) => {
            tracing::debug!(error = %err, "Remote address not captured");
        }
    }

    snapshot
}

/// Reconstructed URL for a captured request, empty when any component is missing.
pub fn request_url(parts: &request::Parts, snapshot: &RequestSnapshot) -> String {
    let path_and_query = original_uri(parts)
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_default();
    build_request_url(&snapshot.scheme, &snapshot.host, path_and_query).unwrap_or_default()
}

/// Response half of the record, from what the tap observed.
pub fn response_snapshot(outcome: TapOutcome, request_url: String) -> ResponseSnapshot {
    let mut headers = outcome.headers;
    if let Some(trailers) = &outcome.trailers {
        for (name, value) in normalize_headers(trailers) {
            headers.insert(format!("{TRAILER_PREFIX}{name}"), value);
        }
    }

    let status_code = if is_grpc(&headers) {
        promote_grpc_status(&mut headers);
        0
    } else {
        i32::from(outcome.status.as_u16())
    };

    ResponseSnapshot {
        headers,
        body: outcome.body,
        request_url,
        status_code,
    }
}
